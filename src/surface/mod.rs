//! Hosting surface — where registered operations live and get dispatched.
//!
//! The registry hands every (definition, closure) pair to a
//! [`HostingSurface`]; [`DispatchSurface`] is the in-process implementation
//! that the stdio and HTTP transports route invocations through.

pub mod http;
pub mod transport;

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use crate::registry::{OperationDef, OperationFn};

// ─── HostingSurface ──────────────────────────────────────────────────────────

/// Generic "register named operation" primitive the registry talks to.
pub trait HostingSurface {
    fn register_tool(&mut self, def: OperationDef, handler: OperationFn) -> Result<()>;
    fn register_resource(&mut self, def: OperationDef, handler: OperationFn) -> Result<()>;
    fn register_prompt(&mut self, def: OperationDef, handler: OperationFn) -> Result<()>;
}

// ─── DispatchSurface ─────────────────────────────────────────────────────────

/// In-process operation routing table.
///
/// Cross-unit name collisions are allowed: the later registration shadows
/// the earlier one, loudly. See DESIGN.md for the product decision behind
/// last-wins.
#[derive(Default)]
pub struct DispatchSurface {
    tools: Vec<(OperationDef, OperationFn)>,
    resources: Vec<(OperationDef, OperationFn)>,
    prompts: Vec<(OperationDef, OperationFn)>,
}

impl DispatchSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        slot: &mut Vec<(OperationDef, OperationFn)>,
        kind: &str,
        def: OperationDef,
        handler: OperationFn,
    ) {
        if let Some(pos) = slot.iter().position(|(d, _)| d.name == def.name) {
            warn!(
                kind,
                name = %def.name,
                "operation name collision — later registration shadows the earlier one"
            );
            slot[pos] = (def, handler);
        } else {
            slot.push((def, handler));
        }
    }

    fn find<'a>(
        slot: &'a [(OperationDef, OperationFn)],
        name: &str,
    ) -> Option<&'a (OperationDef, OperationFn)> {
        slot.iter().find(|(d, _)| d.name == name)
    }

    pub fn tool_defs(&self) -> Vec<&OperationDef> {
        self.tools.iter().map(|(d, _)| d).collect()
    }

    pub fn resource_defs(&self) -> Vec<&OperationDef> {
        self.resources.iter().map(|(d, _)| d).collect()
    }

    pub fn prompt_defs(&self) -> Vec<&OperationDef> {
        self.prompts.iter().map(|(d, _)| d).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        Self::find(&self.tools, name).is_some()
    }

    /// Invoke a registered tool by name.
    pub async fn dispatch_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let (_, handler) = Self::find(&self.tools, name)
            .ok_or_else(|| anyhow::anyhow!("unknown tool: {name}"))?;
        handler(arguments).await
    }

    /// Read a registered resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let (_, handler) = Self::find(&self.resources, uri)
            .ok_or_else(|| anyhow::anyhow!("unknown resource: {uri}"))?;
        handler(Value::Null).await
    }

    /// Render a registered prompt template.
    pub async fn render_prompt(&self, name: &str, arguments: Value) -> Result<String> {
        let (_, handler) = Self::find(&self.prompts, name)
            .ok_or_else(|| anyhow::anyhow!("unknown prompt: {name}"))?;
        handler(arguments).await
    }

    /// Total registered operation count across all kinds.
    pub fn operation_count(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }
}

impl HostingSurface for DispatchSurface {
    fn register_tool(&mut self, def: OperationDef, handler: OperationFn) -> Result<()> {
        Self::register(&mut self.tools, "tool", def, handler);
        Ok(())
    }

    fn register_resource(&mut self, def: OperationDef, handler: OperationFn) -> Result<()> {
        Self::register(&mut self.resources, "resource", def, handler);
        Ok(())
    }

    fn register_prompt(&mut self, def: OperationDef, handler: OperationFn) -> Result<()> {
        Self::register(&mut self.prompts, "prompt", def, handler);
        Ok(())
    }
}
