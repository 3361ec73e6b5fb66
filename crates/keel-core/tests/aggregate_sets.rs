//! 聚合配置与具名配置集的分发行为。

use keel_core::{
    ALL_GENERATIONS, AggregatedSpec, ConfigContext, ConfigSet, ConfigSpec, ConfigTarget,
    CoreError, SchemaRegistry, TypedSpec, UnstructuredSpec, capability,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};

const DUMMY_KIND: &str = "dummy.config.keel.dev";

/// 两个列表配置组成的聚合，其一嵌套带单个成员的具名配置集：
/// 聚合应用后入库 2 条，按名应用配置集的那一刻恰好变为 3 条。
#[test]
fn named_set_application_adds_exactly_one_entry() {
    let registry = Arc::new(bootstrap_registry());
    let ctx = ConfigContext::new(registry.clone());

    let member_one = AggregatedSpec::new();

    let mut nested_set = ConfigSet::new("deferred dummies");
    nested_set
        .push_config(&dummy("set-alice", ""), &registry)
        .unwrap();
    let mut member_two = AggregatedSpec::new();
    member_two.add_set("deferred", nested_set);

    let mut outer = AggregatedSpec::new();
    outer.push_config(&member_one, &registry).unwrap();
    outer.push_config(&member_two, &registry).unwrap();
    assert_eq!(outer.configurations().len(), 2);

    outer.apply_to(&ctx, &ctx).expect("distribute aggregate");
    assert_eq!(ctx.generation(), 2);

    ctx.apply_config_set("deferred").expect("apply set by name");
    assert_eq!(ctx.generation(), 3);

    let (_, configs) = ctx.get_config_for_kind(ALL_GENERATIONS, DUMMY_KIND);
    assert_eq!(configs.len(), 1);
}

/// 聚合配置整体可经字节流往返分发：解码后的聚合应用效果与原件一致。
#[test]
fn aggregate_survives_wire_distribution() {
    let registry = Arc::new(bootstrap_registry());

    let mut aggregate = AggregatedSpec::new();
    aggregate.push_config(&dummy("alice", ""), &registry).unwrap();
    aggregate.push_config(&dummy("", "bob"), &registry).unwrap();
    let bytes = registry.encode(&aggregate).expect("encode");

    let ctx = ConfigContext::new(registry);
    let outcome = ctx.apply_data(&bytes, "wire aggregate").expect("decode");
    outcome.applied.expect("apply aggregate");

    // 两个成员条目加上聚合本身。
    assert_eq!(ctx.generation(), 3);

    let target = Arc::new(DummyTarget::default());
    let (_, result) = ctx.apply_to(ALL_GENERATIONS, target.as_ref());
    result.expect("replay");
    assert_eq!(*target.seen.lock().unwrap(), vec![dummy("alice", ""), dummy("", "bob")]);
}

/// 配置集成员携带批量描述入库，便于诊断回溯来源。
#[test]
fn set_members_carry_batch_description() {
    let registry = Arc::new(bootstrap_registry());
    let ctx = ConfigContext::new(registry.clone());

    let mut set = ConfigSet::new("labelled batch");
    set.push_config(&dummy("alice", ""), &registry).unwrap();
    assert_eq!(set.description(), "labelled batch");
    assert_eq!(set.configurations().len(), 1);
    ctx.add_config_set("batch", set);
    ctx.apply_config_set("batch").expect("apply");

    let (_, entries) = ctx.applied_configs(ALL_GENERATIONS);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].description.starts_with("config set batch"));
}

/// 嵌套了未注册 kind 的聚合：成员照常入库，未知 kind 被逐条上报。
#[test]
fn aggregate_reports_unknown_members_but_stores_them() {
    let registry = Arc::new(bootstrap_registry());
    let ctx = ConfigContext::new(registry);

    let mut aggregate = AggregatedSpec::new();
    aggregate.push_unstructured(
        UnstructuredSpec::from_value(serde_json::json!({
            "type": "plugin.config.keel.dev",
            "payload": "kept",
        }))
        .unwrap(),
    );

    let err = ctx
        .apply_config(Arc::new(aggregate), "bootstrap file")
        .unwrap_err();
    assert!(err.message().contains("bootstrap file"));
    // 成员条目与聚合本身都已入库。
    assert_eq!(ctx.generation(), 2);
    assert!(ctx.validate().is_err());
}

fn bootstrap_registry() -> SchemaRegistry {
    let registry = SchemaRegistry::with_builtin_kinds();
    registry.register_direct::<DummySpec>(DUMMY_KIND).unwrap();
    registry
}

fn dummy(alice: &str, bob: &str) -> DummySpec {
    DummySpec {
        kind: DUMMY_KIND.to_string(),
        alice: alice.to_string(),
        bob: bob.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct DummySpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    alice: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    bob: String,
}

impl TypedSpec for DummySpec {
    fn kind(&self) -> &str {
        &self.kind
    }
}

impl ConfigSpec for DummySpec {
    fn apply_to(&self, _ctx: &ConfigContext, target: &dyn ConfigTarget) -> Result<(), CoreError> {
        let Some(hub) = capability::<DummyTarget>(target) else {
            return Err(CoreError::not_applicable(&self.kind));
        };
        hub.seen.lock().unwrap().push(self.clone());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct DummyTarget {
    seen: Mutex<Vec<DummySpec>>,
}

impl ConfigTarget for DummyTarget {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
