//! Nexus API - REST Surface and Background Services
//!
//! This crate wires the registry together: Axum route handlers over the
//! repository traits, the agent lifecycle service, DNS-01 verification,
//! resolution, the health prober and the webhook dispatcher.
//!
//! Request handlers are bounded-lifetime tasks that own no mutable shared
//! state beyond the repositories; the prober and dispatcher run on their
//! own loops and observe a shared shutdown signal.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;
pub mod validation;

#[cfg(feature = "openapi")]
pub mod openapi;

// Re-export commonly used types
pub use auth::{authenticate, AuthContext};
pub use config::{ApiConfig, RegistryConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{EventBus, RegistryEvent};
pub use routes::create_api_router;
pub use services::{
    AgentService, DnsVerifier, HealthProber, HickoryTxtLookup, ProberConfig, ResolverService,
    StaticTxtLookup, TxtLookup, WebhookDispatcher,
};
pub use state::AppState;
pub use types::*;

#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
