use crate::error::EmitError;
use crate::fields::Fields;
use crate::interpolate::interpolate;
use crate::level::Level;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::backtrace::Backtrace;
use std::error::Error;
use std::sync::OnceLock;

/// 异常信息：随记录附带的错误链与调用栈
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

impl ErrorReport {
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            chain,
            backtrace: None,
        }
    }

    /// 在当前位置抓取调用栈
    pub fn capture(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chain: Vec::new(),
            backtrace: Some(Backtrace::force_capture().to_string()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for cause in &self.chain {
            out.push_str("\nCaused by: ");
            out.push_str(cause);
        }
        if let Some(backtrace) = &self.backtrace {
            out.push('\n');
            out.push_str(backtrace);
        }
        out
    }
}

/// 调用方请求附带的异常信息
#[derive(Debug, Clone, PartialEq)]
pub enum ExcInfo {
    /// 派发时抓取当前调用栈
    Capture,

    /// 调用方提供的错误
    Report(ErrorReport),
}

impl ExcInfo {
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        ExcInfo::Report(ErrorReport::from_error(error))
    }

    pub(crate) fn resolve(self) -> ErrorReport {
        match self {
            ExcInfo::Capture => ErrorReport::capture("Exception captured at call site"),
            ExcInfo::Report(report) => report,
        }
    }
}

impl From<ErrorReport> for ExcInfo {
    fn from(report: ErrorReport) -> Self {
        ExcInfo::Report(report)
    }
}

/// 派发给处理器的日志记录
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub level: Level,

    /// 原始消息，插值推迟到格式化阶段
    pub message: Value,
    pub args: Vec<Value>,

    pub exception: Option<ErrorReport>,
    pub stack: Option<String>,

    pub host: String,
    pub process: u32,
    pub thread: Option<String>,

    pub fields: Fields,
}

impl LogRecord {
    pub fn new(name: impl Into<String>, level: Level, message: impl Into<Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            level,
            message: message.into(),
            args: Vec::new(),
            exception: None,
            stack: None,
            host: host().to_string(),
            process: std::process::id(),
            thread: std::thread::current().name().map(str::to_string),
            fields: Fields::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_exception(mut self, exception: ErrorReport) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_stack(mut self, stack: String) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// 渲染消息；仅当带有参数时才做 printf 风格的 `%` 插值
    pub fn render_message(&self) -> Result<String, EmitError> {
        let template = display_value(&self.message);
        if self.args.is_empty() {
            return Ok(template);
        }
        interpolate(&template, &self.args)
    }
}

fn host() -> &'static str {
    static HOST: OnceLock<String> = OnceLock::new();
    HOST.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
