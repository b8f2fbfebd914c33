use std::path::PathBuf;
use thiserror::Error;

/// 单次记录派发失败（格式化、处理器 I/O 等一律归为此类）
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Formatting failed: {0}")]
    Format(String),

    #[error("Attempt to overwrite reserved record attribute `{0}`")]
    ReservedField(String),

    #[error("Handler `{0}` has no formatter")]
    MissingFormatter(String),

    #[error("Handler I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Handler `{handler}` panicked: {message}")]
    HandlerPanicked { handler: String, message: String },
}

/// 失败兜底记录的执行结果
#[derive(Debug)]
pub enum FallbackOutcome {
    /// 未启用兜底
    Disabled,

    /// 兜底记录已派发
    Emitted,

    /// 兜底记录本身也失败了
    Failed(EmitError),
}

impl FallbackOutcome {
    pub fn is_emitted(&self) -> bool {
        matches!(self, FallbackOutcome::Emitted)
    }
}

/// 日志调用失败，原始错误始终保留
#[derive(Debug, Error)]
#[error("Logger `{logger}` failed to log: {source}")]
pub struct LogError {
    logger: String,
    #[source]
    source: EmitError,
    fallback: FallbackOutcome,
}

impl LogError {
    pub(crate) fn new(logger: impl Into<String>, source: EmitError, fallback: FallbackOutcome) -> Self {
        Self {
            logger: logger.into(),
            source,
            fallback,
        }
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn emit_error(&self) -> &EmitError {
        &self.source
    }

    pub fn fallback(&self) -> &FallbackOutcome {
        &self.fallback
    }

    pub fn into_emit_error(self) -> EmitError {
        self.source
    }
}

/// 构造期错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Logger name must not be empty")]
    EmptyName,

    #[error("Invalid format pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Handler `{0}` requires a path")]
    MissingPath(String),

    #[error("Failed to open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
