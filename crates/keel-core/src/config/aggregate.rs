use crate::config::context::ConfigContext;
use crate::config::{ConfigSpec, ConfigTarget, capability};
use crate::error::{CoreError, ErrorList};
use crate::schema::{
    DEFAULT_VERSION, DirectDecoder, KIND_SEPARATOR, SchemaRegistry, TypedSpec, UnstructuredSpec,
};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use serde::{Deserialize, Serialize};

/// 聚合配置的 kind。
pub const AGGREGATE_KIND: &str = "aggregate.config.keel.dev";

/// 将多个配置组合为单个可分发单元的聚合配置。
///
/// # 设计背景（Why）
/// - 引导文件、跨团队分发的配置包通常一次携带多条配置；聚合配置让它们
///   作为一个整体被序列化、记录与应用。
/// - 嵌套配置以通用回退形态存放：未注册 kind 的成员在聚合层面不丢失，
///   入库后照常参与晚绑定。
///
/// # 契约说明（What）
/// - [`ConfigSpec::apply_to`] 要求目标具备配置上下文能力：嵌套配置逐条经
///   [`ConfigContext::apply_config`] 应用，具名配置集仅登记不应用；
/// - 成员应用失败被聚合上报，单个失败不阻塞其余成员。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    configurations: Vec<UnstructuredSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sets: BTreeMap<String, ConfigSet>,
}

impl AggregatedSpec {
    /// 构造空聚合配置。
    pub fn new() -> Self {
        Self {
            kind: AGGREGATE_KIND.to_string(),
            configurations: Vec::new(),
            sets: BTreeMap::new(),
        }
    }

    /// 追加一条配置，经注册表规范化为通用形态。
    pub fn push_config(
        &mut self,
        spec: &dyn ConfigSpec,
        registry: &SchemaRegistry,
    ) -> Result<(), CoreError> {
        let value = registry.encode_value(spec)?;
        self.configurations.push(UnstructuredSpec::from_value(value)?);
        Ok(())
    }

    /// 直接追加一条通用形态的配置。
    pub fn push_unstructured(&mut self, spec: UnstructuredSpec) {
        self.configurations.push(spec);
    }

    /// 登记一个具名配置集。
    pub fn add_set(&mut self, name: &str, set: ConfigSet) {
        self.sets.insert(name.to_string(), set);
    }

    /// 嵌套配置的只读视图。
    pub fn configurations(&self) -> &[UnstructuredSpec] {
        &self.configurations
    }

    /// 具名配置集的只读视图。
    pub fn sets(&self) -> &BTreeMap<String, ConfigSet> {
        &self.sets
    }
}

impl Default for AggregatedSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl TypedSpec for AggregatedSpec {
    fn kind(&self) -> &str {
        &self.kind
    }
}

impl ConfigSpec for AggregatedSpec {
    fn apply_to(&self, _ctx: &ConfigContext, target: &dyn ConfigTarget) -> Result<(), CoreError> {
        let Some(config_ctx) = capability::<ConfigContext>(target) else {
            return Err(CoreError::not_applicable(&self.kind));
        };
        let mut list = ErrorList::new("applying aggregated configuration");
        for member in &self.configurations {
            list.add(config_ctx.apply_config(Arc::new(member.clone()), "aggregated configuration"));
        }
        for (name, set) in &self.sets {
            config_ctx.add_config_set(name, set.clone());
        }
        list.result()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 具名配置集：一组按名引用、作为整体应用的配置。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSet {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    configurations: Vec<UnstructuredSpec>,
}

impl ConfigSet {
    /// 构造带说明的空配置集。
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            configurations: Vec::new(),
        }
    }

    /// 集合用途说明。
    pub fn description(&self) -> &str {
        &self.description
    }

    /// 追加一个成员，经注册表规范化为通用形态。
    pub fn push_config(
        &mut self,
        spec: &dyn ConfigSpec,
        registry: &SchemaRegistry,
    ) -> Result<(), CoreError> {
        let value = registry.encode_value(spec)?;
        self.configurations.push(UnstructuredSpec::from_value(value)?);
        Ok(())
    }

    /// 直接追加一个通用形态的成员。
    pub fn push_unstructured(&mut self, spec: UnstructuredSpec) {
        self.configurations.push(spec);
    }

    /// 成员的只读视图。
    pub fn configurations(&self) -> &[UnstructuredSpec] {
        &self.configurations
    }
}

/// 注册核心自带的聚合 kind（无版本默认条目与显式 v1）。
pub fn register_builtin(registry: &SchemaRegistry) -> Result<(), CoreError> {
    registry.register_direct::<AggregatedSpec>(AGGREGATE_KIND)?;
    registry.register(
        &format!("{AGGREGATE_KIND}{KIND_SEPARATOR}{DEFAULT_VERSION}"),
        Arc::new(DirectDecoder::<AggregatedSpec>::new()),
    )
}
