//! 版本化类型解析：kind(+version) 到编解码逻辑的注册表。
//!
//! # 模块拆分
//! - `kind` 负责判别符的解析契约；
//! - `encoding` 是字节流与文档树之间的格式缝隙；
//! - `decoder` 定义对象安全的编解码接口与两类内置实现（直接、转换）；
//! - `unstructured` 是未注册 kind 的结构保持回退形态；
//! - `registry` 将以上各件装配为可共享的查找表。

mod decoder;
mod encoding;
mod kind;
mod registry;
mod unstructured;

pub use decoder::{ConvertingDecoder, DirectDecoder, SpecConverter, SpecDecoder};
pub use encoding::{JsonEncoding, SpecEncoding};
pub use kind::{DEFAULT_VERSION, KIND_FIELD, KIND_SEPARATOR, SpecKind, TypedSpec, versionless};
pub use registry::SchemaRegistry;
pub use unstructured::UnstructuredSpec;
