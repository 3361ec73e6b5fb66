use crate::Error;
use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `CoreError` 是 keel-core 跨模块共享的稳定错误类型。
///
/// # 设计背景（Why）
/// - 配置解码、类型解析与回放在不同层次产生的故障需要合流为统一的错误码，
///   调用方据此区分“必须修复输入”的致命错误与“可告警后继续”的可恢复错误。
/// - 核心需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，
///   而是实现 crate 内定义的轻量 [`Error`] 抽象。
///
/// # 契约说明（What）
/// - `code`：`'static` 字符串，遵循 `<域>.<语义>` 约定（见 [`codes`] 模块），承载稳定语义；
/// - `message`：面向排障人员的可读描述；
/// - `cause`：可选底层原因，通过 `source()` 暴露完整链路。
///
/// # 设计取舍（Trade-offs）
/// - 判定谓词（[`Self::is_unknown_kind`]、[`Self::is_not_applicable`]）只看错误码，
///   不遍历 cause 链；包装描述时错误码保持不变，谓词因此在任意包装深度下都成立。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

impl CoreError {
    /// 构造核心错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 构造“未注册 kind”错误，调用方可据此告警后继续处理其余条目。
    pub fn unknown_kind(kind: &str) -> Self {
        Self::new(
            codes::SCHEMA_UNKNOWN_KIND,
            format!("configuration kind `{kind}` is not registered"),
        )
    }

    /// 构造“对当前目标不适用”错误，扇出回放时会被静默跳过。
    pub fn not_applicable(kind: &str) -> Self {
        Self::new(
            codes::CONFIG_NOT_APPLICABLE,
            format!("configuration kind `{kind}` is not applicable to this target"),
        )
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 在消息前追加诊断描述（通常是嵌套应用的描述链），错误码保持不变。
    pub fn with_description(mut self, desc: &str) -> Self {
        if !desc.is_empty() {
            self.message = Cow::Owned(format!("{desc}: {}", self.message));
        }
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 判断错误码是否等于给定值。
    pub fn is_code(&self, code: &str) -> bool {
        self.code == code
    }

    /// 是否为“未注册 kind”错误。
    pub fn is_unknown_kind(&self) -> bool {
        self.is_code(codes::SCHEMA_UNKNOWN_KIND)
    }

    /// 是否为“对目标不适用”错误。
    pub fn is_not_applicable(&self) -> bool {
        self.is_code(codes::CONFIG_NOT_APPLICABLE)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 核心内置的错误码常量集合，保证可观测性系统具有稳定识别符。
pub mod codes {
    /// 载荷缺失顶层类型判别字段。
    pub const SCHEMA_NO_KIND: &str = "schema.no_kind";
    /// 载荷格式损坏，反序列化失败。
    pub const SCHEMA_DECODE: &str = "schema.decode";
    /// 判别字段存在，但 kind 未注册（可恢复，保留通用回退形态）。
    pub const SCHEMA_UNKNOWN_KIND: &str = "schema.unknown_kind";
    /// 编码时的具体类型与注册的解码器不匹配。
    pub const SCHEMA_TYPE_MISMATCH: &str = "schema.type_mismatch";
    /// 注册阶段的契约违例（调用方编程错误）。
    pub const SCHEMA_REGISTRATION: &str = "schema.registration";
    /// 序列化输出失败。
    pub const SCHEMA_ENCODE: &str = "schema.encode";
    /// 配置对当前目标不适用（扇出场景的良性结果）。
    pub const CONFIG_NOT_APPLICABLE: &str = "config.not_applicable";
    /// 按名引用的配置集不存在。
    pub const CONFIG_UNKNOWN_SET: &str = "config.unknown_set";
    /// 聚合的配置应用失败。
    pub const CONFIG_APPLY: &str = "config.apply";
}

/// `ErrorList` 收集一批相互独立的应用失败，最终合并为单个 [`CoreError`]。
///
/// # 设计背景（Why）
/// - 回放与批量应用要求“单个条目失败不阻塞其余条目”，所有失败连同各自的
///   描述一起上报，而不是在第一个错误处中断。
///
/// # 契约说明（What）
/// - [`Self::add`] 吸收一个结果，`Ok` 被忽略；
/// - [`Self::result`] 为空集时返回 `Ok(())`，否则返回错误码为
///   [`codes::CONFIG_APPLY`] 的核心错误，其 cause 为携带全部条目的
///   [`AggregateFailure`]。
pub struct ErrorList {
    description: String,
    errors: Vec<CoreError>,
}

impl ErrorList {
    /// 以聚合场景的描述创建空列表。
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            errors: Vec::new(),
        }
    }

    /// 吸收一个应用结果，失败被记录，成功被忽略。
    pub fn add(&mut self, result: Result<(), CoreError>) {
        if let Err(err) = result {
            self.errors.push(err);
        }
    }

    /// 直接记录一个失败。
    pub fn add_error(&mut self, err: CoreError) {
        self.errors.push(err);
    }

    /// 当前是否没有任何失败。
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// 已记录的失败数量。
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// 合并为最终结果。
    pub fn result(self) -> Result<(), CoreError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let count = self.errors.len();
        Err(
            CoreError::new(codes::CONFIG_APPLY, format!("{}: {count} error(s)", self.description))
                .with_cause(AggregateFailure {
                    entries: self.errors,
                }),
        )
    }
}

/// 聚合失败的底层载体，保留每个条目的错误以便诊断输出。
#[derive(Debug)]
pub struct AggregateFailure {
    entries: Vec<CoreError>,
}

impl AggregateFailure {
    /// 返回全部条目。
    pub fn entries(&self) -> &[CoreError] {
        &self.entries
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl Error for AggregateFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

const _: fn() = || {
    fn assert_error_traits<T: Error + Send + Sync + 'static>() {}

    assert_error_traits::<CoreError>();
    assert_error_traits::<AggregateFailure>();
};
