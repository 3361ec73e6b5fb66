use crate::config::ConfigSpec;
use crate::error::{CoreError, codes};
use crate::schema::decoder::{DirectDecoder, SpecDecoder};
use crate::schema::encoding::{JsonEncoding, SpecEncoding};
use crate::schema::kind::{KIND_FIELD, SpecKind, TypedSpec};
use crate::schema::unstructured::UnstructuredSpec;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use spin::RwLock;

/// 按 kind(+version) 索引解码器的类型注册表。
///
/// # 设计背景（Why）
/// - 各业务子系统在启动引导阶段注册自己的配置 kind，稳态运行期注册表以
///   只读方式被多个上下文共享；注册是追加式的，派生注册表在构造时批量
///   拷入父表的已知类型，之后不再回写父表。
///
/// # 逻辑解析（How）
/// - 解码首先读取顶层判别字段，精确匹配 `kind/version` 条目，否则回退到
///   无版本的 kind 默认条目，再尝试配置的兜底解码器链；
/// - 全部未命中且注册表接受未知 kind 时，返回保持判别符原样的
///   [`UnstructuredSpec`]。
///
/// # 并发契约（What）
/// - 内部使用读写锁，注册应在并发稳态开始之前完成；查询路径只取读锁。
pub struct SchemaRegistry {
    types: RwLock<BTreeMap<String, Arc<dyn SpecDecoder>>>,
    fallback: Option<Arc<dyn SpecDecoder>>,
    accept_unknown: bool,
}

impl SchemaRegistry {
    /// 构造接受未知 kind 的注册表（配置核心使用的形态）。
    pub fn new() -> Self {
        Self {
            types: RwLock::new(BTreeMap::new()),
            fallback: None,
            accept_unknown: true,
        }
    }

    /// 构造拒绝未知 kind 的注册表，未命中时解码直接报错。
    pub fn strict() -> Self {
        Self {
            accept_unknown: false,
            ..Self::new()
        }
    }

    /// 设置兜底解码器，未命中已注册 kind 时先于通用回退尝试。
    pub fn with_fallback(mut self, fallback: Arc<dyn SpecDecoder>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// 构造已预注册核心自带 kind（聚合配置）的注册表。
    ///
    /// 进程内不存在隐式的全局注册表；引导阶段显式调用本方法并在返回值上
    /// 注册各协作方的 kind，测试因此可以为每个用例构造独立实例。
    pub fn with_builtin_kinds() -> Self {
        let registry = Self::new();
        // 内置 kind 均为非空常量，注册不可能失败。
        crate::config::register_builtin(&registry)
            .expect("builtin kind registration must not fail");
        registry
    }

    /// 注册一个 kind 的解码器，重复注册以后到者为准。
    pub fn register(&self, kind: &str, decoder: Arc<dyn SpecDecoder>) -> Result<(), CoreError> {
        let parsed = SpecKind::parse(kind);
        if parsed.base().is_empty() {
            return Err(CoreError::new(
                codes::SCHEMA_REGISTRATION,
                "cannot register a decoder for an empty kind",
            ));
        }
        self.types.write().insert(kind.to_string(), decoder);
        Ok(())
    }

    /// 为线上形态与内存形态一致的类型注册直接解码器。
    pub fn register_direct<T>(&self, kind: &str) -> Result<(), CoreError>
    where
        T: ConfigSpec + Serialize + DeserializeOwned,
    {
        self.register(kind, Arc::new(DirectDecoder::<T>::new()))
    }

    /// 查找 kind 的解码器：先精确匹配，带版本时再回退到无版本默认条目。
    pub fn decoder(&self, kind: &str) -> Option<Arc<dyn SpecDecoder>> {
        let types = self.types.read();
        if let Some(decoder) = types.get(kind) {
            return Some(decoder.clone());
        }
        let parsed = SpecKind::parse(kind);
        if parsed.explicit_version().is_some() {
            return types.get(parsed.base()).cloned();
        }
        None
    }

    /// 是否已注册给定 kind（含无版本默认条目的回退）。
    pub fn contains_kind(&self, kind: &str) -> bool {
        self.decoder(kind).is_some()
    }

    /// 批量拷入另一个注册表的已知类型，源注册表保持不变。
    pub fn add_known_types(&self, other: &SchemaRegistry) {
        let source = other.types.read();
        let mut types = self.types.write();
        for (kind, decoder) in source.iter() {
            types.insert(kind.clone(), decoder.clone());
        }
    }

    /// 返回排序后的已知 kind 列表。
    pub fn known_kinds(&self) -> Vec<String> {
        self.types.read().keys().cloned().collect()
    }

    /// 以默认 JSON 编码解码字节流。
    pub fn decode(&self, data: &[u8]) -> Result<Box<dyn ConfigSpec>, CoreError> {
        self.decode_with(data, &JsonEncoding)
    }

    /// 以指定编码解码字节流。
    pub fn decode_with(
        &self,
        data: &[u8],
        encoding: &dyn SpecEncoding,
    ) -> Result<Box<dyn ConfigSpec>, CoreError> {
        let value = encoding.decode_value(data)?;
        self.decode_value(value)
    }

    /// 解码文档树，返回最具体的已知类型值或通用回退形态。
    pub fn decode_value(&self, value: Value) -> Result<Box<dyn ConfigSpec>, CoreError> {
        let kind = value
            .get(KIND_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if kind.is_empty() {
            return Err(CoreError::new(codes::SCHEMA_NO_KIND, "no type found"));
        }
        if let Some(decoder) = self.decoder(&kind) {
            return decoder.decode(&value);
        }
        if let Some(fallback) = &self.fallback {
            match fallback.decode(&value) {
                Ok(spec) => return Ok(spec),
                Err(err) if err.is_unknown_kind() => {}
                Err(err) => return Err(err),
            }
        }
        if self.accept_unknown {
            return Ok(Box::new(UnstructuredSpec::from_value(value)?));
        }
        Err(CoreError::unknown_kind(&kind))
    }

    /// 将配置值编码为文档树。
    pub fn encode_value(&self, spec: &dyn ConfigSpec) -> Result<Value, CoreError> {
        if let Some(unstructured) = spec.as_any().downcast_ref::<UnstructuredSpec>() {
            return Ok(unstructured.to_value());
        }
        match self.decoder(spec.kind()) {
            Some(decoder) => decoder.encode(spec),
            None => Err(CoreError::unknown_kind(spec.kind())),
        }
    }

    /// 以默认 JSON 编码序列化配置值。
    pub fn encode(&self, spec: &dyn ConfigSpec) -> Result<Vec<u8>, CoreError> {
        self.encode_with(spec, &JsonEncoding)
    }

    /// 以指定编码序列化配置值。
    pub fn encode_with(
        &self,
        spec: &dyn ConfigSpec,
        encoding: &dyn SpecEncoding,
    ) -> Result<Vec<u8>, CoreError> {
        let value = self.encode_value(spec)?;
        encoding.encode_value(&value)
    }

    /// 通过编码再解码的往返，规范化绕过注册表手工构造的值。
    pub fn convert(&self, spec: &dyn ConfigSpec) -> Result<Box<dyn ConfigSpec>, CoreError> {
        if spec.kind().is_empty() {
            return Err(CoreError::new(codes::SCHEMA_NO_KIND, "no type found"));
        }
        let value = self.encode_value(spec)?;
        self.decode_value(value)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const _: fn() = || {
    fn assert_shared<T: Send + Sync>() {}

    assert_shared::<SchemaRegistry>();
};
