//! Pero Relay daemon library.
//!
//! `perod` exposes a uniform MCP tool/resource/prompt surface over several
//! unrelated partner integrations. The interesting machinery is in two
//! places: the capability registry (`registry`), which assembles the surface
//! out of independently developed handler units with per-unit failure
//! isolation, and the task orchestrator (`orchestrator`), which drives
//! long-running cancellable polling workflows such as "invite a user, wait
//! for them to accept, then add them to TestFlight" (`workflow`).

pub mod clients;
pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod surface;
pub mod workflow;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use clients::ClientContext;
use config::ServerConfig;
use orchestrator::TaskOrchestrator;
use registry::CapabilityRegistry;
use surface::DispatchSurface;

/// Discover all built-in handler units and assemble the dispatch surface.
///
/// Returns an error only when *zero* units could be constructed — a relay
/// with nothing to relay is a misconfiguration the operator needs to see.
pub fn build_surface(
    config: Arc<ServerConfig>,
) -> Result<(Arc<DispatchSurface>, Arc<TaskOrchestrator>)> {
    let orchestrator = TaskOrchestrator::new();
    let ctx = ClientContext::new(config, Arc::clone(&orchestrator));

    let registry = CapabilityRegistry::new();
    let descriptors = registry.discover(clients::builtin_factories(&ctx));
    if descriptors.is_empty() {
        anyhow::bail!(
            "no handler units available — check the [appstore]/[googleplay]/[ssh] \
             config sections or their environment variables"
        );
    }

    let unit_names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    info!(units = ?unit_names, "capability surface assembled");

    let mut surface = DispatchSurface::new();
    registry.register_all(descriptors, &mut surface);
    Ok((Arc::new(surface), orchestrator))
}
