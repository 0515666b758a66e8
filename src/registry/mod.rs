//! Capability registry — assembles the server's tool/resource/prompt surface
//! out of independently developed handler units.
//!
//! Units are constructed through a provided list of fallible factories
//! (typically [`crate::clients::builtin_factories`]); a unit whose factory
//! fails — missing configuration, bad credentials file, whatever — is logged
//! and skipped so the rest of the surface still comes up. Registration is
//! equally isolated: one unit failing to attach an operation never blocks
//! the units after it.

use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};

use crate::surface::HostingSurface;

// ─── Operations ──────────────────────────────────────────────────────────────

/// Handler closure for one named operation. Takes the caller-supplied JSON
/// arguments and produces human-readable text for the MCP content block.
pub type OperationFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// The operation kinds a handler unit can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Tool,
    Resource,
    Prompt,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Tool => "tool",
            OperationKind::Resource => "resource",
            OperationKind::Prompt => "prompt",
        }
    }
}

/// Metadata for one operation, as surfaced in `tools/list` and friends.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OperationDef {
    pub name: String,
    pub description: String,
    /// JSON Schema for the operation arguments. `Value::Null` for
    /// resources, which take no arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl OperationDef {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Ordered name → (definition, handler) table for one operation kind.
///
/// Owned by the registry while a unit populates it, then handed to the
/// hosting surface at registration time. Keys must be unique within one
/// table; a duplicate insert from the same unit is rejected with a warning
/// (the first registration wins — a unit colliding with itself is a unit
/// bug, not a reason to take the unit down).
pub struct OperationTable {
    kind: OperationKind,
    entries: Vec<(OperationDef, OperationFn)>,
}

impl OperationTable {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Insert an operation. Duplicate names within this table are rejected.
    pub fn insert(&mut self, def: OperationDef, handler: OperationFn) {
        if self.entries.iter().any(|(d, _)| d.name == def.name) {
            warn!(
                kind = self.kind.as_str(),
                name = %def.name,
                "duplicate operation name within one handler unit — keeping the first"
            );
            return;
        }
        self.entries.push((def, handler));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(OperationDef, OperationFn)> {
        self.entries.iter()
    }
}

// ─── Handler units ───────────────────────────────────────────────────────────

/// A self-contained integration module exposing named operations.
///
/// Units are developed independently; the registry treats them as opaque
/// capability providers and only requires the three registration entry
/// points. A unit may leave any of its tables empty.
pub trait HandlerUnit: Send + Sync {
    /// Unique unit name (e.g. `"AppStoreConnect"`), used in logs and as the
    /// descriptor identity.
    fn name(&self) -> &'static str;

    fn register_tools(&self, table: &mut OperationTable);
    fn register_resources(&self, table: &mut OperationTable);
    fn register_prompts(&self, table: &mut OperationTable);
}

/// Fallible unit constructor. The owning client context is captured by the
/// closure at the call site, keeping the registry domain-agnostic.
pub type HandlerFactory = Box<dyn FnOnce() -> Result<Box<dyn HandlerUnit>> + Send>;

/// One successfully constructed unit and its populated operation tables.
pub struct HandlerDescriptor {
    pub name: String,
    pub tools: OperationTable,
    pub resources: OperationTable,
    pub prompts: OperationTable,
}

impl HandlerDescriptor {
    /// Total operation count across all three tables.
    pub fn operation_count(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Discovers handler units and merges their operations into one namespace.
///
/// The registry is a thin composition root: it runs single-threaded at
/// startup, before the hosting surface accepts any calls.
#[derive(Default)]
pub struct CapabilityRegistry;

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Construct each unit and collect its operation tables.
    ///
    /// A factory returning `Err` is logged and skipped — one broken unit
    /// never aborts discovery of the others. Descriptors come back in
    /// factory order.
    pub fn discover(&self, factories: Vec<(&'static str, HandlerFactory)>) -> Vec<HandlerDescriptor> {
        let mut descriptors = Vec::new();

        for (label, factory) in factories {
            let unit = match factory() {
                Ok(unit) => unit,
                Err(e) => {
                    warn!(unit = label, error = %e, "handler unit unavailable — skipping");
                    continue;
                }
            };

            let mut tools = OperationTable::new(OperationKind::Tool);
            let mut resources = OperationTable::new(OperationKind::Resource);
            let mut prompts = OperationTable::new(OperationKind::Prompt);
            unit.register_tools(&mut tools);
            unit.register_resources(&mut resources);
            unit.register_prompts(&mut prompts);

            let descriptor = HandlerDescriptor {
                name: unit.name().to_string(),
                tools,
                resources,
                prompts,
            };
            info!(
                unit = %descriptor.name,
                tools = descriptor.tools.len(),
                resources = descriptor.resources.len(),
                prompts = descriptor.prompts.len(),
                "handler unit discovered"
            );
            descriptors.push(descriptor);
        }

        descriptors
    }

    /// Register every operation of every descriptor with the hosting surface.
    ///
    /// No transactionality: each registration call is independent, and a
    /// failure in one unit's registration is logged without blocking the
    /// units after it. Cross-unit name collisions are the surface's call
    /// (the in-process surface shadows last-wins with a warning).
    pub fn register_all(
        &self,
        descriptors: Vec<HandlerDescriptor>,
        surface: &mut dyn HostingSurface,
    ) {
        for descriptor in descriptors {
            let mut failed = 0usize;
            let total = descriptor.operation_count();

            for (def, handler) in descriptor.tools.iter() {
                if let Err(e) = surface.register_tool(def.clone(), Arc::clone(handler)) {
                    warn!(unit = %descriptor.name, tool = %def.name, error = %e, "tool registration failed");
                    failed += 1;
                }
            }
            for (def, handler) in descriptor.resources.iter() {
                if let Err(e) = surface.register_resource(def.clone(), Arc::clone(handler)) {
                    warn!(unit = %descriptor.name, resource = %def.name, error = %e, "resource registration failed");
                    failed += 1;
                }
            }
            for (def, handler) in descriptor.prompts.iter() {
                if let Err(e) = surface.register_prompt(def.clone(), Arc::clone(handler)) {
                    warn!(unit = %descriptor.name, prompt = %def.name, error = %e, "prompt registration failed");
                    failed += 1;
                }
            }

            info!(
                unit = %descriptor.name,
                registered = total - failed,
                failed,
                "handler unit registered"
            );
        }
    }
}
