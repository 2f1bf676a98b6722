//! Endpoint health probing.
//!
//! A single tick loop enumerates every `active` agent and fans the probes
//! out over a bounded worker pool. Probes are HEAD-then-GET with a
//! per-request timeout; persistence is written ONLY on health transitions,
//! so steady-state ticks cost zero database writes.
//!
//! The per-agent failure counter lives in memory and is deliberately lost
//! on restart: a truly-down agent re-fails to threshold within
//! `fail_threshold × interval` anyway.

use crate::events::{EventBus, RegistryEvent};
use chrono::Utc;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use nexus_core::{HealthState, LedgerAction, SYSTEM_ACTOR};
use nexus_storage::{AgentRepo, LedgerRepo, ProbeTarget};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Prober tuning knobs, split out of [`crate::RegistryConfig`] so the
/// prober can be built standalone in tests.
#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub concurrency: usize,
    pub fail_threshold: u32,
}

impl Default for ProberConfig {
    fn default() -> Self {
        ProberConfig {
            interval: Duration::from_secs(300),
            timeout: Duration::from_secs(10),
            concurrency: 10,
            fail_threshold: 3,
        }
    }
}

/// The background health prober.
pub struct HealthProber {
    agents: Arc<dyn AgentRepo>,
    ledger: Arc<dyn LedgerRepo>,
    bus: EventBus,
    client: reqwest::Client,
    config: ProberConfig,
    failures: DashMap<Uuid, u32>,
}

impl HealthProber {
    pub fn new(
        agents: Arc<dyn AgentRepo>,
        ledger: Arc<dyn LedgerRepo>,
        bus: EventBus,
        config: ProberConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        HealthProber {
            agents,
            ledger,
            bus,
            client,
            config,
            failures: DashMap::new(),
        }
    }

    /// Run the tick loop until the shutdown signal flips. In-flight
    /// probes of the final tick are abandoned with the task; no partial
    /// writes can result because writes only follow a completed
    /// transition decision.
    pub fn spawn(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // The tick itself is deadline-bounded by the
                        // interval, and shutdown abandons in-flight
                        // probes mid-tick.
                        tokio::select! {
                            result = tokio::time::timeout(self.config.interval, self.run_tick()) => {
                                if result.is_err() {
                                    tracing::warn!("Probe tick hit its deadline; remaining probes abandoned");
                                }
                            }
                            _ = shutdown.changed() => {
                                tracing::info!("Health prober stopping mid-tick");
                                break;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Health prober stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One full probe pass over all active endpoints.
    pub async fn run_tick(&self) {
        let targets = match self.agents.agent_list_probe_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!(error = %e, "Probe tick could not list targets");
                return;
            }
        };
        if targets.is_empty() {
            return;
        }

        tracing::debug!(count = targets.len(), "Probe tick starting");
        stream::iter(targets)
            .for_each_concurrent(self.config.concurrency, |target| async move {
                self.probe_and_record(target).await;
            })
            .await;
    }

    async fn probe_and_record(&self, target: ProbeTarget) {
        let passed = self.probe(&target.endpoint).await;

        if passed {
            self.failures.insert(target.id, 0);
            // Unknown → healthy is the initial observation and writes
            // without an event; degraded → healthy is a recovery.
            match target.health_status {
                HealthState::Healthy => {}
                HealthState::Unknown => {
                    self.persist_health(&target, HealthState::Healthy).await;
                }
                HealthState::Degraded => {
                    self.persist_health(&target, HealthState::Healthy).await;
                    self.record_transition(
                        &target,
                        LedgerAction::HealthRecovered,
                        RegistryEvent::HealthRecovered {
                            agent_uri: target.uri.clone(),
                        },
                    )
                    .await;
                }
            }
        } else {
            let count = {
                let mut entry = self.failures.entry(target.id).or_insert(0);
                *entry += 1;
                *entry
            };
            tracing::debug!(agent_uri = %target.uri, consecutive_failures = count, "Probe failed");

            if count >= self.config.fail_threshold
                && target.health_status != HealthState::Degraded
            {
                self.persist_health(&target, HealthState::Degraded).await;
                self.record_transition(
                    &target,
                    LedgerAction::HealthDegraded,
                    RegistryEvent::HealthDegraded {
                        agent_uri: target.uri.clone(),
                        consecutive_failures: count,
                    },
                )
                .await;
            }
        }
    }

    async fn persist_health(&self, target: &ProbeTarget, health: HealthState) {
        let last_seen = (health == HealthState::Healthy).then(Utc::now);
        if let Err(e) = self
            .agents
            .agent_update_health(target.id, health, last_seen)
            .await
        {
            tracing::warn!(agent_uri = %target.uri, error = %e, "Health write failed");
        }
    }

    async fn record_transition(
        &self,
        target: &ProbeTarget,
        action: LedgerAction,
        event: RegistryEvent,
    ) {
        if let Err(e) = self
            .ledger
            .ledger_append(
                action,
                &target.uri,
                SYSTEM_ACTOR,
                serde_json::json!({ "endpoint": target.endpoint }),
            )
            .await
        {
            tracing::warn!(agent_uri = %target.uri, error = %e, "Health ledger append failed");
        }
        tracing::info!(agent_uri = %target.uri, event = event.event_type(), "Health transition");
        self.bus.publish(event);
    }

    /// HEAD with the configured timeout; on any failure, one GET retry.
    /// Any 2xx from either request is a pass.
    async fn probe(&self, endpoint: &str) -> bool {
        match self.client.head(endpoint).send().await {
            Ok(response) if response.status().is_success() => return true,
            Ok(response) => {
                tracing::trace!(endpoint, status = %response.status(), "HEAD probe non-2xx");
            }
            Err(e) => {
                tracing::trace!(endpoint, error = %e, "HEAD probe failed");
            }
        }
        match self.client.get(endpoint).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Current consecutive-failure count, for tests and diagnostics.
    pub fn failure_count(&self, id: Uuid) -> u32 {
        self.failures.get(&id).map(|c| *c).unwrap_or(0)
    }
}
