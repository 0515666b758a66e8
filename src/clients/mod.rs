//! Integration units and the shared context they are constructed from.
//!
//! Each submodule is one independently developed handler unit. Adding an
//! integration means writing a unit and appending its factory to
//! [`builtin_factories`] — the registry takes it from there.

pub mod appstore;
pub mod googleplay;
pub mod ssh;

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::orchestrator::TaskOrchestrator;
use crate::registry::HandlerFactory;

/// Shared state handed to every unit factory.
pub struct ClientContext {
    pub config: Arc<ServerConfig>,
    pub orchestrator: Arc<TaskOrchestrator>,
    /// One pooled HTTP client for all outbound partner calls.
    pub http: reqwest::Client,
}

impl ClientContext {
    pub fn new(config: Arc<ServerConfig>, orchestrator: Arc<TaskOrchestrator>) -> Arc<Self> {
        Arc::new(Self {
            config,
            orchestrator,
            http: reqwest::Client::new(),
        })
    }
}

/// The built-in unit factories, in registration order.
///
/// Pluggability without reflection: adding a unit is one line here.
/// Factories capture the context so the registry stays domain-agnostic.
pub fn builtin_factories(ctx: &Arc<ClientContext>) -> Vec<(&'static str, HandlerFactory)> {
    let appstore_ctx = Arc::clone(ctx);
    let googleplay_ctx = Arc::clone(ctx);
    let ssh_ctx = Arc::clone(ctx);
    vec![
        (
            "AppStoreConnect",
            Box::new(move || appstore::AppStoreUnit::create(appstore_ctx)),
        ),
        (
            "GooglePlay",
            Box::new(move || googleplay::GooglePlayUnit::create(googleplay_ctx)),
        ),
        (
            "RemoteShell",
            Box::new(move || ssh::RemoteShellUnit::create(ssh_ctx)),
        ),
    ]
}
