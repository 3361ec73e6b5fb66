#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::result_large_err)]
#![doc = "keel-core: 软件供应链元数据工具的配置传播与版本化类型解析核心。"]
#![doc = ""]
#![doc = "核心由三部分组成：按 kind(+version) 解析字节流的类型注册表（`schema`）、"]
#![doc = "追加式且以 generation 编号的配置日志（`config::store`），以及带重入保护的"]
#![doc = "逐消费者回放协议（`config::updater`）。各业务子系统（凭据、签名密钥、仓库别名等）"]
#![doc = "只消费 `ConfigSpec` 与 `ConfigContext` 契约，核心对配置的具体语义保持无知。"]

extern crate alloc;

pub mod config;
pub mod error;
pub mod schema;

pub use config::{
    AGGREGATE_KIND, ALL_GENERATIONS, AggregatedSpec, AppliedConfig, ConfigContext, ConfigSelector,
    ConfigSet, ConfigSpec, ConfigStore, ConfigTarget, ConfigUpdater, DataApplyOutcome, capability,
    register_builtin,
};
pub use error::{CoreError, ErrorCause, ErrorList, codes};
pub use schema::{
    ConvertingDecoder, DirectDecoder, JsonEncoding, SchemaRegistry, SpecConverter, SpecDecoder,
    SpecEncoding, SpecKind, TypedSpec, UnstructuredSpec,
};

use alloc::boxed::Box;
use core::fmt;

/// 统一的 `Result` 别名，错误侧默认为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

/// `keel-core` 中所有错误类型实现的 `no_std` 基础 Trait。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 环境中不可用，需要一个对象安全、平台无关的
///   错误抽象来串联底层错误链。
///
/// # 契约说明（What）
/// - 实现类型必须提供 `Debug` 与 `Display`，便于日志与诊断输出。
/// - `source` 返回链路上游错误，语义与 `std::error::Error::source` 对齐；
///   返回引用的生命周期受限于 `self`。
pub trait Error: fmt::Debug + fmt::Display {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}
