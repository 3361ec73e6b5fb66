use crate::config::aggregate::ConfigSet;
use crate::config::store::{AppliedConfig, ConfigStore};
use crate::config::{ConfigSelector, ConfigSpec, ConfigTarget};
use crate::error::{CoreError, ErrorList, codes};
use crate::schema::{SchemaRegistry, TypedSpec, UnstructuredSpec};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicBool, Ordering};

struct ContextCore {
    registry: Arc<SchemaRegistry>,
    store: ConfigStore,
    skip_unknown: AtomicBool,
}

/// 配置上下文：绑定一个存储与一个注册表，暴露应用、查询与回放操作。
///
/// # 设计背景（Why）
/// - 存储由上下文独占；注册表可在多个上下文之间只读共享；
/// - 克隆与 [`Self::with_info`] 返回共享同一底层状态的轻量视图，视图之间只有
///   诊断描述不同，嵌套应用的错误因此能携带完整的描述链。
///
/// # 并发契约（What）
/// - 所有操作同步执行；同一上下文上的应用操作由存储锁全序化；
/// - [`ConfigSpec::apply_to`] 回调在锁外执行，配置实现可以重入上下文。
#[derive(Clone)]
pub struct ConfigContext {
    core: Arc<ContextCore>,
    description: String,
}

/// [`ConfigContext::apply_data`] 的结果：解码产物连同应用结果一起返回。
///
/// 解码失败是唯一的硬错误；应用失败时配置仍已入库，调用方拿到
/// 解码后的值用于后续检视。
pub struct DataApplyOutcome {
    /// 解码出的配置。
    pub spec: Arc<dyn ConfigSpec>,
    /// 应用阶段的结果。
    pub applied: Result<(), CoreError>,
}

impl ConfigContext {
    /// 以给定注册表构造空上下文。
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            core: Arc::new(ContextCore {
                registry,
                store: ConfigStore::new(),
                skip_unknown: AtomicBool::new(false),
            }),
            description: String::new(),
        }
    }

    /// 当前视图的诊断描述。
    pub fn info(&self) -> &str {
        &self.description
    }

    /// 返回携带嵌套描述链的视图，底层存储与锁保持同一份。
    pub fn with_info(&self, desc: &str) -> Self {
        let description = if self.description.is_empty() {
            desc.to_string()
        } else {
            format!("{desc}--{}", self.description)
        };
        Self {
            core: self.core.clone(),
            description,
        }
    }

    /// 绑定的类型注册表。
    pub fn registry(&self) -> &SchemaRegistry {
        &self.core.registry
    }

    /// 切换“跳过未知 kind”模式，返回之前的取值。
    ///
    /// 批量装载场景可先开启本模式，再用 [`Self::validate`] 检查是否仍有
    /// 未注册的 kind 被跳过。
    pub fn skip_unknown_config(&self, enabled: bool) -> bool {
        self.core.skip_unknown.swap(enabled, Ordering::SeqCst)
    }

    /// 当前 generation。
    pub fn generation(&self) -> u64 {
        self.core.store.generation()
    }

    /// 清空已应用配置，返回清空时刻的 generation；计数器继续递增。
    pub fn reset(&self) -> u64 {
        self.core.store.reset()
    }

    /// 解码配置字节流，不触发应用。
    pub fn decode_config(&self, data: &[u8]) -> Result<Arc<dyn ConfigSpec>, CoreError> {
        self.core.registry.decode(data).map(Arc::from)
    }

    /// 应用一条配置并无条件入库。
    ///
    /// # 逻辑解析（How）
    /// 1. 通用回退形态先对照注册表求值一次，晚注册的 kind 立即生效；
    /// 2. 以 `desc--父描述` 构造嵌套描述链并调用 [`ConfigSpec::apply_to`]，
    ///    目标为本上下文自身（聚合配置等自描述配置由此生效）；
    /// 3. “不适用”结果不视为失败：kind 未注册时以未知 kind 错误上报
    ///    （跳过模式下静默），其余情况视为成功；
    /// 4. 配置连同描述链入库，应用失败不影响后续检视与回放。
    pub fn apply_config(
        &self,
        spec: Arc<dyn ConfigSpec>,
        desc: &str,
    ) -> Result<(), CoreError> {
        let mut spec = spec;
        let mut generic = false;
        if let Some(unstructured) = spec.as_any().downcast_ref::<UnstructuredSpec>() {
            match unstructured.evaluate(self.registry()) {
                Ok(Some(concrete)) => spec = Arc::from(concrete),
                Ok(None) => generic = true,
                Err(err) => return Err(err.with_description(desc)),
            }
        }
        let unknown = (generic && !self.core.skip_unknown.load(Ordering::SeqCst))
            .then(|| CoreError::unknown_kind(spec.kind()));

        let scoped = self.with_info(desc);
        let outcome = match spec.apply_to(&scoped, self) {
            Err(err) if err.is_not_applicable() => match unknown {
                Some(unknown) => Err(unknown),
                None => Ok(()),
            },
            outcome => outcome,
        };

        tracing::debug!(
            kind = spec.kind(),
            description = scoped.info(),
            applied = outcome.is_ok(),
            "configuration recorded",
        );
        self.core.store.apply(spec, scoped.info());
        outcome.map_err(|err| err.with_description(scoped.info()))
    }

    /// 解码字节流并应用；解码产物与应用结果一并返回。
    pub fn apply_data(&self, data: &[u8], desc: &str) -> Result<DataApplyOutcome, CoreError> {
        let spec: Arc<dyn ConfigSpec> = Arc::from(self.core.registry.decode(data)?);
        let applied = self.apply_config(spec.clone(), desc);
        Ok(DataApplyOutcome { spec, applied })
    }

    /// 按 generation 下限与可选谓词查询配置。
    pub fn get_config(
        &self,
        floor: u64,
        selector: Option<&dyn ConfigSelector>,
    ) -> (u64, Vec<Arc<dyn ConfigSpec>>) {
        let (generation, entries) =
            self.core
                .store
                .configs_for_selector(&self.core.registry, floor, selector);
        (generation, configs(entries))
    }

    /// 按 kind 查询；请求无版本 kind 时返回其所有版本。
    pub fn get_config_for_kind(&self, floor: u64, kind: &str) -> (u64, Vec<Arc<dyn ConfigSpec>>) {
        let (generation, entries) =
            self.core
                .store
                .configs_for_kind(&self.core.registry, kind, floor, None);
        (generation, configs(entries))
    }

    /// 按逻辑名称查询。
    pub fn get_config_for_name(&self, floor: u64, name: &str) -> (u64, Vec<Arc<dyn ConfigSpec>>) {
        let (generation, entries) =
            self.core
                .store
                .configs_for_name(&self.core.registry, name, floor, None);
        (generation, configs(entries))
    }

    /// 连同 generation 与描述链查询条目，供诊断与回放使用。
    pub fn applied_configs(&self, floor: u64) -> (u64, Vec<AppliedConfig>) {
        self.core
            .store
            .configs_for_selector(&self.core.registry, floor, None)
    }

    /// 将水位线之上的全部配置按原始顺序应用到目标。
    ///
    /// # 契约说明（What）
    /// - “不适用”结果被静默跳过；其余失败连同各自的描述聚合上报，单个
    ///   失败条目不阻塞其余条目；
    /// - 无论是否有失败，都返回存储的当前 generation 作为新的水位线，
    ///   失败条目因此不会被无限重试。
    pub fn apply_to(
        &self,
        watermark: u64,
        target: &dyn ConfigTarget,
    ) -> (u64, Result<(), CoreError>) {
        let current = self.generation();
        if current <= watermark {
            return (watermark, Ok(()));
        }
        let (current, entries) = self.applied_configs(watermark);
        let skip_unknown = self.core.skip_unknown.load(Ordering::SeqCst);
        tracing::debug!(
            watermark,
            current,
            entries = entries.len(),
            "replaying configuration entries",
        );
        let mut list = ErrorList::new("config apply errors");
        for entry in entries {
            match entry.config.apply_to(&self.with_info(&entry.description), target) {
                Ok(()) => {}
                Err(err) if err.is_not_applicable() => {}
                Err(err) if skip_unknown && err.is_unknown_kind() => {}
                Err(err) => list.add_error(err.with_description(&entry.description)),
            }
        }
        (current, list.result())
    }

    /// 重新求值全部已存储条目，上报仍未注册的 kind。
    pub fn validate(&self) -> Result<(), CoreError> {
        let (_, entries) = self.applied_configs(crate::config::ALL_GENERATIONS);
        let mut list = ErrorList::new("unknown configuration kinds");
        for entry in entries {
            if entry
                .config
                .as_any()
                .downcast_ref::<UnstructuredSpec>()
                .is_some()
            {
                list.add_error(
                    CoreError::unknown_kind(entry.config.kind())
                        .with_description(&entry.description),
                );
            }
        }
        list.result()
    }

    /// 登记一个具名配置集。
    pub fn add_config_set(&self, name: &str, set: ConfigSet) {
        self.core.store.add_set(name, set);
    }

    /// 按名应用配置集，每个成员作为独立条目入库。
    pub fn apply_config_set(&self, name: &str) -> Result<(), CoreError> {
        let set = self.core.store.set(name).ok_or_else(|| {
            CoreError::new(
                codes::CONFIG_UNKNOWN_SET,
                format!("config set `{name}` is not defined"),
            )
        })?;
        let desc = format!("config set {name}");
        let mut list = ErrorList::new(format!("applying {desc}"));
        for member in set.configurations() {
            list.add(self.apply_config(Arc::new(member.clone()), &desc));
        }
        list.result()
    }
}

impl ConfigTarget for ConfigContext {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn configs(entries: Vec<AppliedConfig>) -> Vec<Arc<dyn ConfigSpec>> {
    entries.into_iter().map(|entry| entry.config).collect()
}

const _: fn() = || {
    fn assert_shared<T: Send + Sync>() {}

    assert_shared::<ConfigContext>();
};
