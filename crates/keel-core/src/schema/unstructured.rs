use crate::config::{ConfigContext, ConfigSpec, ConfigTarget};
use crate::error::{CoreError, codes};
use crate::schema::kind::{KIND_FIELD, TypedSpec};
use crate::schema::registry::SchemaRegistry;
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use core::any::Any;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// 未注册 kind 的结构保持回退形态。
///
/// # 设计背景（Why）
/// - 配置可能在其 kind 的解码器注册之前就被记录；此时以通用形态保留完整的
///   原始文档，之后每次从存储读取时都会重新对照注册表求值，晚注册的 kind
///   无需重新提交原始字节即可得到正确解释。
///
/// # 契约说明（What）
/// - 顶层判别字段按原样保留，序列化输出与输入在语义上等价（字段不增不减）；
/// - [`Self::evaluate`] 不改变报告的 kind；
/// - 对任何目标执行 [`ConfigSpec::apply_to`] 时，若 kind 仍未注册，返回
///   “不适用”结果，扇出回放因此会静默跳过它。
#[derive(Clone, Debug)]
pub struct UnstructuredSpec {
    kind: String,
    object: Map<String, Value>,
}

impl UnstructuredSpec {
    /// 以给定 kind 构造空文档。
    pub fn new(kind: &str) -> Self {
        let mut object = Map::new();
        object.insert(KIND_FIELD.to_string(), Value::String(kind.to_string()));
        Self {
            kind: kind.to_string(),
            object,
        }
    }

    /// 从文档树构造，顶层必须是带非空判别字段的对象。
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(object) = value else {
            return Err(CoreError::new(
                codes::SCHEMA_DECODE,
                "top-level document must be an object",
            ));
        };
        let kind = object
            .get(KIND_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if kind.is_empty() {
            return Err(CoreError::new(codes::SCHEMA_NO_KIND, "no type found"));
        }
        Ok(Self { kind, object })
    }

    /// 改写判别符，文档中的顶层字段同步更新。
    pub fn set_kind(&mut self, kind: &str) {
        self.kind = kind.to_string();
        self.object
            .insert(KIND_FIELD.to_string(), Value::String(kind.to_string()));
    }

    /// 原始文档的只读视图。
    pub fn object(&self) -> &Map<String, Value> {
        &self.object
    }

    /// 以文档树形式返回完整内容。
    pub fn to_value(&self) -> Value {
        Value::Object(self.object.clone())
    }

    /// 对照注册表重新求值。
    ///
    /// # 契约说明（What）
    /// - kind 仍未注册时返回 `Ok(None)`，文档保持通用形态；
    /// - 解码器存在但载荷损坏时返回解码错误，调用方自行决定是否保留通用形态。
    pub fn evaluate(
        &self,
        registry: &SchemaRegistry,
    ) -> Result<Option<Box<dyn ConfigSpec>>, CoreError> {
        match registry.decoder(&self.kind) {
            Some(decoder) => decoder.decode(&self.to_value()).map(Some),
            None => Ok(None),
        }
    }
}

impl PartialEq for UnstructuredSpec {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.object == other.object
    }
}

impl TypedSpec for UnstructuredSpec {
    fn kind(&self) -> &str {
        &self.kind
    }
}

impl ConfigSpec for UnstructuredSpec {
    fn apply_to(&self, ctx: &ConfigContext, target: &dyn ConfigTarget) -> Result<(), CoreError> {
        match self.evaluate(ctx.registry())? {
            Some(concrete) => concrete.apply_to(ctx, target),
            None => Err(CoreError::not_applicable(&self.kind)),
        }
    }

    fn name(&self) -> Option<&str> {
        self.object.get("name").and_then(Value::as_str)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Serialize for UnstructuredSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.object.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnstructuredSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
