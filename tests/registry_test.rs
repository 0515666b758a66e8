//! Integration tests for the capability registry and dispatch surface.

use std::sync::Arc;

use serde_json::{json, Value};

use perod::registry::{
    CapabilityRegistry, HandlerFactory, HandlerUnit, OperationDef, OperationFn, OperationTable,
};
use perod::surface::DispatchSurface;

// ── Test units ───────────────────────────────────────────────────────────────

/// Minimal unit exposing one tool per entry in `tools`, each answering with a
/// fixed reply string.
struct StubUnit {
    name: &'static str,
    tools: Vec<(&'static str, &'static str)>,
    resources: Vec<(&'static str, &'static str)>,
}

impl StubUnit {
    fn factory(
        name: &'static str,
        tools: Vec<(&'static str, &'static str)>,
    ) -> (&'static str, HandlerFactory) {
        (
            name,
            Box::new(move || {
                Ok(Box::new(StubUnit {
                    name,
                    tools,
                    resources: Vec::new(),
                }) as Box<dyn HandlerUnit>)
            }),
        )
    }
}

fn reply(text: &'static str) -> OperationFn {
    Arc::new(move |_args: Value| Box::pin(async move { Ok(text.to_string()) }))
}

impl HandlerUnit for StubUnit {
    fn name(&self) -> &'static str {
        self.name
    }

    fn register_tools(&self, table: &mut OperationTable) {
        for &(tool_name, answer) in &self.tools {
            table.insert(
                OperationDef::new(tool_name, "stub tool", json!({"type": "object"})),
                reply(answer),
            );
        }
    }

    fn register_resources(&self, table: &mut OperationTable) {
        for &(uri, answer) in &self.resources {
            table.insert(OperationDef::new(uri, "stub resource", Value::Null), reply(answer));
        }
    }

    fn register_prompts(&self, _table: &mut OperationTable) {}
}

fn broken_factory(name: &'static str) -> (&'static str, HandlerFactory) {
    (
        name,
        Box::new(|| -> anyhow::Result<Box<dyn HandlerUnit>> {
            anyhow::bail!("missing credentials")
        }),
    )
}

// ── Discovery tests ──────────────────────────────────────────────────────────

#[test]
fn test_failed_factory_is_skipped_without_aborting_discovery() {
    let registry = CapabilityRegistry::new();
    let descriptors = registry.discover(vec![
        StubUnit::factory("Alpha", vec![("alpha_status", "alpha ok")]),
        broken_factory("Broken"),
        StubUnit::factory("Gamma", vec![("gamma_status", "gamma ok")]),
    ]);

    let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Alpha", "Gamma"],
        "the broken unit must be skipped, the rest kept in factory order"
    );
}

#[test]
fn test_descriptor_counts_cover_all_operation_kinds() {
    struct RichUnit;
    impl HandlerUnit for RichUnit {
        fn name(&self) -> &'static str {
            "Rich"
        }
        fn register_tools(&self, table: &mut OperationTable) {
            table.insert(
                OperationDef::new("do_thing", "does the thing", json!({"type": "object"})),
                reply("done"),
            );
        }
        fn register_resources(&self, table: &mut OperationTable) {
            table.insert(
                OperationDef::new("rich://things", "all things", Value::Null),
                reply("[]"),
            );
        }
        fn register_prompts(&self, table: &mut OperationTable) {
            table.insert(
                OperationDef::new("thing_prompt", "prompt for things", json!({"type": "object"})),
                reply("please do the thing"),
            );
        }
    }

    let registry = CapabilityRegistry::new();
    let descriptors = registry.discover(vec![(
        "Rich",
        Box::new(|| Ok(Box::new(RichUnit) as Box<dyn HandlerUnit>)) as HandlerFactory,
    )]);

    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].operation_count(), 3);
}

#[test]
fn test_duplicate_name_within_one_unit_keeps_the_first() {
    struct SelfCollidingUnit;
    impl HandlerUnit for SelfCollidingUnit {
        fn name(&self) -> &'static str {
            "SelfColliding"
        }
        fn register_tools(&self, table: &mut OperationTable) {
            table.insert(
                OperationDef::new("status", "first", json!({"type": "object"})),
                reply("first"),
            );
            table.insert(
                OperationDef::new("status", "second", json!({"type": "object"})),
                reply("second"),
            );
        }
        fn register_resources(&self, _table: &mut OperationTable) {}
        fn register_prompts(&self, _table: &mut OperationTable) {}
    }

    let registry = CapabilityRegistry::new();
    let descriptors = registry.discover(vec![(
        "SelfColliding",
        Box::new(|| Ok(Box::new(SelfCollidingUnit) as Box<dyn HandlerUnit>)) as HandlerFactory,
    )]);

    assert_eq!(descriptors[0].tools.len(), 1, "duplicate insert must be dropped");
    let (def, _) = descriptors[0].tools.iter().next().unwrap();
    assert_eq!(def.description, "first");
}

// ── Registration and dispatch tests ──────────────────────────────────────────

#[tokio::test]
async fn test_register_all_merges_units_into_one_namespace() {
    let registry = CapabilityRegistry::new();
    let descriptors = registry.discover(vec![
        StubUnit::factory("Alpha", vec![("alpha_status", "alpha ok")]),
        StubUnit::factory("Gamma", vec![("gamma_status", "gamma ok")]),
    ]);

    let mut surface = DispatchSurface::new();
    registry.register_all(descriptors, &mut surface);

    assert_eq!(surface.operation_count(), 2);
    assert!(surface.has_tool("alpha_status"));
    assert!(surface.has_tool("gamma_status"));

    let answer = surface
        .dispatch_tool("gamma_status", json!({}))
        .await
        .expect("dispatch should reach the unit handler");
    assert_eq!(answer, "gamma ok");
}

#[tokio::test]
async fn test_cross_unit_collision_shadows_last_wins() {
    let registry = CapabilityRegistry::new();
    let descriptors = registry.discover(vec![
        StubUnit::factory("Alpha", vec![("configure", "alpha configured")]),
        StubUnit::factory("Gamma", vec![("configure", "gamma configured")]),
    ]);

    let mut surface = DispatchSurface::new();
    registry.register_all(descriptors, &mut surface);

    // One visible entry: the later registration shadows the earlier one.
    assert_eq!(surface.tool_defs().len(), 1);
    let answer = surface
        .dispatch_tool("configure", json!({}))
        .await
        .expect("the surviving handler should dispatch normally");
    assert_eq!(answer, "gamma configured");
}

#[tokio::test]
async fn test_unknown_tool_is_an_error() {
    let surface = DispatchSurface::new();
    let err = surface
        .dispatch_tool("no_such_tool", json!({}))
        .await
        .expect_err("dispatching an unregistered tool must fail");
    assert!(err.to_string().contains("no_such_tool"));
}
