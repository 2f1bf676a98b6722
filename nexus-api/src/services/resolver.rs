//! `agent://` URI resolution, single and batch.

use crate::error::{ApiError, ApiResult};
use crate::types::{
    BatchResolveItem, BatchResolveResponse, DeprecationInfo, MAX_BATCH_RESOLVE,
};
use nexus_core::{Agent, AgentUri, RegistryError};
use nexus_storage::AgentRepo;
use std::sync::Arc;

/// A successful resolution: the live record plus deprecation metadata
/// when the agent is sunsetting.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub agent: Agent,
    pub deprecation: Option<DeprecationInfo>,
}

/// Resolves URIs against the agent store.
pub struct ResolverService {
    agents: Arc<dyn AgentRepo>,
}

impl ResolverService {
    pub fn new(agents: Arc<dyn AgentRepo>) -> Self {
        ResolverService { agents }
    }

    /// Resolve a URI string.
    pub async fn resolve_str(&self, uri: &str) -> ApiResult<Resolved> {
        let parsed = AgentUri::parse(uri).map_err(ApiError::from)?;
        self.resolve(&parsed).await
    }

    /// Resolve a parsed URI. Agents resolve while `active` or
    /// `deprecated`; every other status fails as not resolvable.
    pub async fn resolve(&self, uri: &AgentUri) -> ApiResult<Resolved> {
        let agent = self
            .agents
            .agent_get_by_agent_id(&uri.agent_id)
            .await?
            .filter(|a| &a.uri() == uri)
            .ok_or_else(|| {
                ApiError::from(RegistryError::not_found("Agent", uri.to_string()))
            })?;

        if !agent.status.is_resolvable() {
            return Err(RegistryError::NotResolvable {
                uri: uri.to_string(),
                status: agent.status,
            }
            .into());
        }

        let deprecation = (agent.status == nexus_core::AgentStatus::Deprecated).then(|| {
            DeprecationInfo {
                sunset_date: agent.sunset_date,
                replacement_uri: agent.replacement_uri.clone(),
            }
        });

        Ok(Resolved { agent, deprecation })
    }

    /// Batch resolution: up to [`MAX_BATCH_RESOLVE`] URIs, each item
    /// succeeding or failing independently.
    pub async fn resolve_batch(&self, uris: Vec<String>) -> ApiResult<BatchResolveResponse> {
        if uris.len() > MAX_BATCH_RESOLVE {
            return Err(ApiError::invalid_input(format!(
                "batch resolve accepts at most {} URIs, got {}",
                MAX_BATCH_RESOLVE,
                uris.len()
            )));
        }

        let mut results = Vec::with_capacity(uris.len());
        for uri in uris {
            let item = match self.resolve_str(&uri).await {
                Ok(resolved) => BatchResolveItem {
                    uri,
                    endpoint: Some(resolved.agent.endpoint.clone()),
                    status: Some(resolved.agent.status),
                    error: None,
                },
                Err(e) => BatchResolveItem {
                    uri,
                    endpoint: None,
                    status: None,
                    error: Some(e.message),
                },
            };
            results.push(item);
        }

        let count = results.len();
        Ok(BatchResolveResponse { results, count })
    }
}
