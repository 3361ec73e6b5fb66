//! 配置对象模型与传播引擎。
//!
//! # 模块拆分
//! - 本文件定义对象模型契约：[`ConfigSpec`]、[`ConfigTarget`] 与选择器；
//! - `store` 是追加式、以 generation 编号的配置日志；
//! - `context` 绑定存储与注册表，暴露应用、查询与回放操作；
//! - `updater` 是带重入保护的逐消费者回放游标；
//! - `aggregate` 将多个配置组合为单个可分发单元，并承载具名配置集。

mod aggregate;
mod context;
mod store;
mod updater;

pub use aggregate::{AGGREGATE_KIND, AggregatedSpec, ConfigSet, register_builtin};
pub use context::{ConfigContext, DataApplyOutcome};
pub use store::{AppliedConfig, ConfigStore};
pub use updater::ConfigUpdater;

use crate::error::CoreError;
use crate::schema::TypedSpec;
use core::any::Any;

/// 查询“最后一次 reset 之后的全部配置”时使用的 generation 下限。
pub const ALL_GENERATIONS: u64 = 0;

/// 可记录、可回放的配置契约。
///
/// # 设计背景（Why）
/// - 各业务子系统以本 trait 声明自己的配置；核心只负责记录与传播，对配置的
///   具体语义保持无知。
///
/// # 契约说明（What）
/// - [`Self::apply_to`] 探测目标的能力集合（见 [`capability`]），目标不具备
///   所需能力时必须返回 [`CoreError::not_applicable`]，而不是一般性失败；
///   同一个复合配置扇出到多个互不相关的消费者上下文时，各方据此忽略
///   与己无关的条目。
/// - [`Self::name`] 为可选的逻辑名称，供按名查询使用。
/// - [`Self::as_any`] 支撑注册表编码与存储重求值所需的具体类型还原。
pub trait ConfigSpec: TypedSpec + Send + Sync + 'static {
    /// 将配置应用到目标。
    fn apply_to(&self, ctx: &ConfigContext, target: &dyn ConfigTarget) -> Result<(), CoreError>;

    /// 配置的逻辑名称，默认匿名。
    fn name(&self) -> Option<&str> {
        None
    }

    /// 以 `Any` 暴露自身，供能力探测与编码路径下转型。
    fn as_any(&self) -> &dyn Any;
}

/// 配置应用目标的最小契约。
///
/// # 契约说明（What）
/// - 目标以 `Any` 暴露自身，配置实现通过 [`capability`] 逐个探测所需能力；
/// - 回放可能并发进行，目标内部的可变状态需自行加锁。
pub trait ConfigTarget: Send + Sync {
    /// 以 `Any` 暴露自身。
    fn as_any(&self) -> &dyn Any;
}

/// 探测目标是否提供能力 `C`，不匹配时返回 `None`。
pub fn capability<C: 'static>(target: &dyn ConfigTarget) -> Option<&C> {
    target.as_any().downcast_ref::<C>()
}

/// 查询配置时的谓词。
pub trait ConfigSelector: Send + Sync {
    /// 是否选中给定配置。
    fn select(&self, config: &dyn ConfigSpec) -> bool;
}

impl<F> ConfigSelector for F
where
    F: Fn(&dyn ConfigSpec) -> bool + Send + Sync,
{
    fn select(&self, config: &dyn ConfigSpec) -> bool {
        self(config)
    }
}
