use crate::config::ConfigSpec;
use crate::error::{CoreError, codes};
use crate::schema::kind::TypedSpec;
use alloc::boxed::Box;
use alloc::format;
use core::marker::PhantomData;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 对象安全的类型解码与编码契约，注册表按 kind 持有它的实现。
///
/// # 设计背景（Why）
/// - 注册表需要以 trait 对象形式存放各 kind 的编解码逻辑；具体类型在注册时
///   捕获，运行期不依赖任何反射机制。
///
/// # 契约说明（What）
/// - `decode` 从文档树构造具体类型值，失败返回 [`codes::SCHEMA_DECODE`]；
/// - `encode` 将具体类型值写回文档树，传入值的实际类型与注册的类型不一致时
///   返回 [`codes::SCHEMA_TYPE_MISMATCH`]。
pub trait SpecDecoder: Send + Sync {
    /// 将文档树解码为具体配置值。
    fn decode(&self, value: &Value) -> Result<Box<dyn ConfigSpec>, CoreError>;

    /// 将配置值编码回文档树。
    fn encode(&self, spec: &dyn ConfigSpec) -> Result<Value, CoreError>;
}

/// 直接解码器：线上形态与内存中的规范形态一致，serde 驱动双向转换。
///
/// # 逻辑解析（How）
/// - 具体类型 `T` 在构造时通过类型参数捕获；
/// - `decode` 直接反序列化为 `T` 并装箱；
/// - `encode` 以 `Any` 下转型还原 `T` 后序列化，下转型失败即为调用方传错对象。
pub struct DirectDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DirectDecoder<T>
where
    T: ConfigSpec + Serialize + DeserializeOwned,
{
    /// 构造针对 `T` 的直接解码器。
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for DirectDecoder<T>
where
    T: ConfigSpec + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SpecDecoder for DirectDecoder<T>
where
    T: ConfigSpec + Serialize + DeserializeOwned,
{
    fn decode(&self, value: &Value) -> Result<Box<dyn ConfigSpec>, CoreError> {
        let spec: T = serde_json::from_value(value.clone()).map_err(|err| {
            CoreError::new(codes::SCHEMA_DECODE, format!("cannot decode configuration: {err}"))
        })?;
        Ok(Box::new(spec))
    }

    fn encode(&self, spec: &dyn ConfigSpec) -> Result<Value, CoreError> {
        let typed = spec.as_any().downcast_ref::<T>().ok_or_else(|| {
            CoreError::new(
                codes::SCHEMA_TYPE_MISMATCH,
                format!(
                    "expected `{}`, received an incompatible value for kind `{}`",
                    core::any::type_name::<T>(),
                    spec.kind(),
                ),
            )
        })?;
        serde_json::to_value(typed).map_err(|err| {
            CoreError::new(codes::SCHEMA_ENCODE, format!("cannot encode configuration: {err}"))
        })
    }
}

/// 线上形态与规范形态之间的双向映射，多个线上版本可收敛到同一规范值。
///
/// # 契约说明（What）
/// - `W` 为线上（版本化）表示；`to_canonical` 产出版本无关的规范值；
/// - `from_canonical` 将规范值写回该版本的线上表示，传入值与实现预期的具体
///   类型不一致时返回 [`codes::SCHEMA_TYPE_MISMATCH`]。
pub trait SpecConverter<W>: Send + Sync {
    /// 线上表示转规范值。
    fn to_canonical(&self, wire: W) -> Result<Box<dyn ConfigSpec>, CoreError>;

    /// 规范值转线上表示。
    fn from_canonical(&self, spec: &dyn ConfigSpec) -> Result<W, CoreError>;
}

/// 转换解码器：线上形态与规范形态不同，借助 [`SpecConverter`] 桥接。
///
/// # 设计背景（Why）
/// - 同一 kind 的多个线上版本（`k`、`k/v2`）各自注册一个转换解码器，
///   全部收敛到同一个版本无关的内存规范值，版本演进不扩散到消费方。
pub struct ConvertingDecoder<W, C> {
    converter: C,
    _marker: PhantomData<fn() -> W>,
}

impl<W, C> ConvertingDecoder<W, C>
where
    W: Serialize + DeserializeOwned,
    C: SpecConverter<W>,
{
    /// 以转换器构造解码器。
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            _marker: PhantomData,
        }
    }
}

impl<W, C> SpecDecoder for ConvertingDecoder<W, C>
where
    W: Serialize + DeserializeOwned,
    C: SpecConverter<W>,
{
    fn decode(&self, value: &Value) -> Result<Box<dyn ConfigSpec>, CoreError> {
        let wire: W = serde_json::from_value(value.clone()).map_err(|err| {
            CoreError::new(codes::SCHEMA_DECODE, format!("cannot decode configuration: {err}"))
        })?;
        self.converter.to_canonical(wire)
    }

    fn encode(&self, spec: &dyn ConfigSpec) -> Result<Value, CoreError> {
        let wire = self.converter.from_canonical(spec)?;
        serde_json::to_value(&wire).map_err(|err| {
            CoreError::new(codes::SCHEMA_ENCODE, format!("cannot encode configuration: {err}"))
        })
    }
}
