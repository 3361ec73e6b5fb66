use crate::error::{CoreError, codes};
use alloc::format;
use alloc::vec::Vec;
use serde_json::Value;

/// 字节流与结构化文档之间的编解码缝隙。
///
/// # 设计背景（Why）
/// - 注册表内部以结构化的 [`Value`] 树工作，具体的字节格式（JSON，或协作方
///   引入的其它格式）通过该 trait 注入，类型解析逻辑因此与格式无关。
///
/// # 契约说明（What）
/// - `decode_value` 将输入字节解析为文档树，失败时返回
///   [`codes::SCHEMA_DECODE`]，属于调用方必须修复输入的致命错误；
/// - `encode_value` 将文档树序列化为字节，失败时返回 [`codes::SCHEMA_ENCODE`]。
pub trait SpecEncoding: Send + Sync {
    /// 格式名称，用于诊断输出。
    fn name(&self) -> &'static str;

    /// 解析字节流。
    fn decode_value(&self, data: &[u8]) -> Result<Value, CoreError>;

    /// 序列化文档树。
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CoreError>;
}

/// 默认的 JSON 编解码实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEncoding;

impl JsonEncoding {
    /// 构造实例，等价于 `Default`。
    pub const fn new() -> Self {
        Self
    }
}

impl SpecEncoding for JsonEncoding {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode_value(&self, data: &[u8]) -> Result<Value, CoreError> {
        serde_json::from_slice(data).map_err(|err| {
            CoreError::new(codes::SCHEMA_DECODE, format!("cannot parse json document: {err}"))
        })
    }

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(value).map_err(|err| {
            CoreError::new(codes::SCHEMA_ENCODE, format!("cannot serialize json document: {err}"))
        })
    }
}
