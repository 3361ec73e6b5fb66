use alloc::string::{String, ToString};
use core::fmt;

/// 线上文档中承载类型判别符的顶层字段名。
pub const KIND_FIELD: &str = "type";

/// kind 与 version 之间的分隔符。
pub const KIND_SEPARATOR: char = '/';

/// 省略 version 时的默认值。
pub const DEFAULT_VERSION: &str = "v1";

/// 所有可注册类型值的最小接口：报告自身的 kind 字符串。
///
/// # 契约说明（What）
/// - 返回值为 `<kind>` 或 `<kind>/<version>`；省略 version 时视为
///   [`DEFAULT_VERSION`]。
/// - kind 字符串在对象生命周期内保持稳定，注册表与存储索引均以它为键。
pub trait TypedSpec {
    /// 返回类型判别符。
    fn kind(&self) -> &str;
}

/// kind 字符串的结构化形态，提供 base 与 version 的拆分视图。
///
/// # 设计背景（Why）
/// - 存储索引按无版本的 base 建桶，使同一 kind 的所有版本共享一个桶；
///   查询时再按 version 相等做子筛选。解析逻辑集中在这里，避免各处手写
///   字符串切分。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecKind {
    base: String,
    version: Option<String>,
}

impl SpecKind {
    /// 解析 kind 字符串，按首个分隔符拆出 base 与 version。
    pub fn parse(kind: &str) -> Self {
        match kind.split_once(KIND_SEPARATOR) {
            Some((base, version)) => Self {
                base: base.to_string(),
                version: (!version.is_empty()).then(|| version.to_string()),
            },
            None => Self {
                base: kind.to_string(),
                version: None,
            },
        }
    }

    /// 无版本的基础 kind。
    pub fn base(&self) -> &str {
        &self.base
    }

    /// 生效的 version，省略时为 [`DEFAULT_VERSION`]。
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// 显式书写的 version，未书写时为 `None`。
    pub fn explicit_version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for SpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}{KIND_SEPARATOR}{version}", self.base),
            None => f.write_str(&self.base),
        }
    }
}

/// 去掉 version 后缀，返回 kind 的 base 部分。
pub fn versionless(kind: &str) -> &str {
    match kind.split_once(KIND_SEPARATOR) {
        Some((base, _)) => base,
        None => kind,
    }
}
