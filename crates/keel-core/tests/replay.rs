//! 配置记录与回放协议的端到端行为。

use keel_core::{
    ALL_GENERATIONS, ConfigContext, ConfigSpec, ConfigTarget, ConfigUpdater, CoreError,
    SchemaRegistry, TypedSpec, capability, codes,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};

const DUMMY_KIND: &str = "dummy.config.keel.dev";
const FAILING_KIND: &str = "failing.config.keel.dev";

/// 连续 N 次应用后，generation 恰为 N，分配的序号按序为 1..=N。
#[test]
fn sequential_applies_assign_dense_generations() {
    let ctx = fresh_context();
    for expected in 1..=4u64 {
        ctx.apply_config(Arc::new(dummy("", "")), "seq entry").unwrap();
        assert_eq!(ctx.generation(), expected);
    }
    let (generation, entries) = ctx.applied_configs(ALL_GENERATIONS);
    assert_eq!(generation, 4);
    let observed: Vec<u64> = entries.iter().map(|entry| entry.generation).collect();
    assert_eq!(observed, [1, 2, 3, 4]);
}

/// 在任何应用之前创建的消费者，`update` 后按原始顺序观察到全部配置。
#[test]
fn updater_created_before_applies_observes_in_order() {
    let ctx = fresh_context();
    let target = Arc::new(DummyTarget::default());
    let updater = ConfigUpdater::new(ctx.clone(), target.clone());

    ctx.apply_config(Arc::new(dummy("alice", "")), "first").unwrap();
    ctx.apply_config(Arc::new(dummy("", "bob")), "second").unwrap();

    updater.update().expect("replay");
    assert_eq!(*target.seen.lock().unwrap(), vec![dummy("alice", ""), dummy("", "bob")]);
    assert_eq!(updater.state(), (2, false));
}

/// 没有新配置时连续 `update` 不产生额外应用，两次都返回成功。
#[test]
fn update_is_idempotent_without_new_entries() {
    let ctx = fresh_context();
    let target = Arc::new(DummyTarget::default());
    let updater = ConfigUpdater::new(ctx.clone(), target.clone());

    ctx.apply_config(Arc::new(dummy("alice", "")), "only").unwrap();
    updater.update().expect("first update");
    updater.update().expect("second update");
    assert_eq!(target.seen.lock().unwrap().len(), 1);
    assert_eq!(updater.state(), (1, false));
}

/// 谓词查询只返回被选中的配置，generation 依旧如实返回。
#[test]
fn selector_query_filters_entries() {
    let ctx = fresh_context();
    ctx.apply_config(Arc::new(dummy("alice", "")), "first").unwrap();
    ctx.apply_config(Arc::new(dummy("", "bob")), "second").unwrap();

    let only_bob = |config: &dyn ConfigSpec| {
        config
            .as_any()
            .downcast_ref::<DummySpec>()
            .is_some_and(|dummy| !dummy.bob.is_empty())
    };
    let (generation, configs) = ctx.get_config(ALL_GENERATIONS, Some(&only_bob));
    assert_eq!(generation, 2);
    assert_eq!(configs.len(), 1);
}

/// kind 未注册时配置照常入库并上报未知 kind 错误；注册后同一条目无需
/// 重新提交即可按具体类型查询与回放。
#[test]
fn late_registration_reinterprets_stored_entry() {
    let registry = Arc::new(SchemaRegistry::new());
    let ctx = ConfigContext::new(registry.clone());

    let decoded = ctx
        .decode_config(br#"{"type":"dummy.config.keel.dev","alice":"late"}"#)
        .expect("decode without applying");
    assert_eq!(decoded.kind(), DUMMY_KIND);
    assert_eq!(ctx.generation(), 0);

    let outcome = ctx
        .apply_data(br#"{"type":"dummy.config.keel.dev","alice":"late"}"#, "early file")
        .expect("decode succeeds");
    let err = outcome.applied.unwrap_err();
    assert!(err.is_unknown_kind());
    assert_eq!(ctx.generation(), 1);

    registry.register_direct::<DummySpec>(DUMMY_KIND).unwrap();

    let (_, configs) = ctx.get_config_for_kind(ALL_GENERATIONS, DUMMY_KIND);
    assert_eq!(configs.len(), 1);
    let typed = configs[0]
        .as_any()
        .downcast_ref::<DummySpec>()
        .expect("concrete after registration");
    assert_eq!(typed, &dummy("late", ""));

    let target = Arc::new(DummyTarget::default());
    let updater = ConfigUpdater::new(ctx, target.clone());
    updater.update().expect("replay");
    assert_eq!(*target.seen.lock().unwrap(), vec![dummy("late", "")]);
}

/// 对 N 个互不相关的目标回放“处处不适用”的配置，不聚合出任何错误。
#[test]
fn fan_out_of_inapplicable_config_yields_no_errors() {
    let ctx = fresh_context();
    ctx.apply_config(Arc::new(dummy("alice", "")), "dummy entry").unwrap();

    struct UnrelatedA;
    struct UnrelatedB;
    struct UnrelatedC;
    impl ConfigTarget for UnrelatedA {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }
    impl ConfigTarget for UnrelatedB {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }
    impl ConfigTarget for UnrelatedC {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    let (generation, result) = ctx.apply_to(ALL_GENERATIONS, &UnrelatedA);
    result.expect("target a");
    assert_eq!(generation, 1);
    ctx.apply_to(ALL_GENERATIONS, &UnrelatedB).1.expect("target b");
    ctx.apply_to(ALL_GENERATIONS, &UnrelatedC).1.expect("target c");
}

/// reset 清空查询结果，其后的 generation 继续从 reset 前的计数器递增。
#[test]
fn reset_clears_entries_but_keeps_counter() {
    let ctx = fresh_context();
    ctx.apply_config(Arc::new(dummy("alice", "")), "one").unwrap();
    ctx.apply_config(Arc::new(dummy("", "bob")), "two").unwrap();

    assert_eq!(ctx.reset(), 2);
    let (generation, configs) = ctx.get_config(ALL_GENERATIONS, None);
    assert_eq!(generation, 2);
    assert!(configs.is_empty());

    ctx.apply_config(Arc::new(dummy("alice", "bob")), "three").unwrap();
    assert_eq!(ctx.generation(), 3);
}

/// reset 之前取得的水位线不会被 reset 之后的旧内容重新满足：
/// 水位线越过空查询区间继续推进。
#[test]
fn watermark_advances_past_quiet_periods() {
    let ctx = fresh_context();
    let target = Arc::new(DummyTarget::default());
    let updater = ConfigUpdater::new(ctx.clone(), target.clone());

    ctx.apply_config(Arc::new(dummy("alice", "")), "before reset").unwrap();
    updater.update().expect("first replay");
    ctx.reset();

    updater.update().expect("replay after reset");
    assert_eq!(updater.state(), (1, false));
    assert_eq!(target.seen.lock().unwrap().len(), 1);
}

/// 解码成功但应用失败时：解码产物返回给调用方，配置仍然入库，
/// 回放聚合该失败一次，水位线照常推进，失败条目不被无限重试。
#[test]
fn failed_application_is_recorded_and_not_retried() {
    let registry = Arc::new(SchemaRegistry::new());
    registry.register_direct::<FailingSpec>(FAILING_KIND).unwrap();
    let ctx = ConfigContext::new(registry);

    let outcome = ctx
        .apply_data(br#"{"type":"failing.config.keel.dev"}"#, "broken entry")
        .expect("decode succeeds");
    assert_eq!(outcome.spec.kind(), FAILING_KIND);
    assert!(outcome.applied.is_err());
    assert_eq!(ctx.generation(), 1);

    let target = Arc::new(DummyTarget::default());
    let updater = ConfigUpdater::new(ctx, target);
    let err = updater.update().unwrap_err();
    assert!(err.is_code(codes::CONFIG_APPLY));
    assert_eq!(updater.state(), (1, false));

    updater.update().expect("entry is behind the watermark now");
}

/// 并发 `update` 在在途保护下既不死锁也不重复应用条目：
/// 竞争失败的调用立即成功返回，追赶由后续调用完成。
#[test]
fn concurrent_updates_apply_each_entry_once() {
    let ctx = fresh_context();
    let target = Arc::new(DummyTarget::default());
    let updater = Arc::new(ConfigUpdater::new(ctx.clone(), target.clone()));

    ctx.apply_config(Arc::new(dummy("alice", "")), "first").unwrap();
    ctx.apply_config(Arc::new(dummy("", "bob")), "second").unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let updater = updater.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..16 {
                updater.update().expect("concurrent update");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("join worker");
    }
    updater.update().expect("final catch-up");

    assert_eq!(*target.seen.lock().unwrap(), vec![dummy("alice", ""), dummy("", "bob")]);
    assert_eq!(updater.state(), (2, false));
}

fn fresh_context() -> ConfigContext {
    let registry = Arc::new(SchemaRegistry::new());
    registry.register_direct::<DummySpec>(DUMMY_KIND).unwrap();
    ConfigContext::new(registry)
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

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FailingSpec {
    #[serde(rename = "type")]
    kind: String,
}

impl TypedSpec for FailingSpec {
    fn kind(&self) -> &str {
        &self.kind
    }
}

impl ConfigSpec for FailingSpec {
    fn apply_to(&self, _ctx: &ConfigContext, _target: &dyn ConfigTarget) -> Result<(), CoreError> {
        Err(CoreError::new(codes::CONFIG_APPLY, "injected failure").with_cause(BackendUnavailable))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 协作方侧的底层失败，作为 cause 挂入核心错误链。
#[derive(Debug, thiserror::Error)]
#[error("credential backend unavailable")]
struct BackendUnavailable;

impl keel_core::Error for BackendUnavailable {
    fn source(&self) -> Option<&(dyn keel_core::Error + 'static)> {
        None
    }
}
