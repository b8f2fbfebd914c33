use crate::error::{ConfigError, EmitError};
use crate::fields::Fields;
use crate::level::Level;
use crate::record::{display_value, ErrorReport, LogRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// 格式化器：把记录渲染成最终文本
pub trait Formatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> Result<String, EmitError>;
}

pub const DEFAULT_PATTERN: &str = "{timestamp} [{level}] {name}: {message} {fields}";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Timestamp,
    Level,
    Name,
    Message,
    Fields,
    Host,
    Process,
    Thread,
}

/// 文本格式化器
///
/// 模板使用 `{placeholder}` 占位，`{{` / `}}` 转义花括号。
/// 可用占位符：`timestamp` `level` `name` `message` `fields` `host` `process` `thread`。
#[derive(Debug, Clone)]
pub struct TextFormatter {
    pattern: String,
    segments: Vec<Segment>,
}

impl TextFormatter {
    pub fn new(pattern: impl Into<String>) -> Result<Self, ConfigError> {
        let pattern = pattern.into();
        let segments = parse_pattern(&pattern)?;
        Ok(Self { pattern, segments })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            segments: vec![
                Segment::Timestamp,
                Segment::Literal(" [".to_string()),
                Segment::Level,
                Segment::Literal("] ".to_string()),
                Segment::Name,
                Segment::Literal(": ".to_string()),
                Segment::Message,
                Segment::Literal(" ".to_string()),
                Segment::Fields,
            ],
        }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, record: &LogRecord) -> Result<String, EmitError> {
        let mut line = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Timestamp => line.push_str(&timestamp(&record.timestamp)),
                Segment::Level => line.push_str(&record.level.to_string()),
                Segment::Name => line.push_str(&record.name),
                Segment::Message => line.push_str(&record.render_message()?),
                Segment::Fields => line.push_str(&render_fields(&record.fields)),
                Segment::Host => line.push_str(&record.host),
                Segment::Process => line.push_str(&record.process.to_string()),
                Segment::Thread => line.push_str(record.thread.as_deref().unwrap_or("-")),
            }
        }

        let mut out = line.trim_end().to_string();
        if let Some(exception) = &record.exception {
            out.push('\n');
            out.push_str(&exception.render());
        }
        if let Some(stack) = &record.stack {
            out.push_str("\nStack (most recent call last):\n");
            out.push_str(stack);
        }
        Ok(out)
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn render_fields(fields: &Fields) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, display_value(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(invalid("unclosed placeholder")),
                    }
                }

                let segment = match name.trim() {
                    "timestamp" => Segment::Timestamp,
                    "level" => Segment::Level,
                    "name" => Segment::Name,
                    "message" => Segment::Message,
                    "fields" => Segment::Fields,
                    "host" => Segment::Host,
                    "process" => Segment::Process,
                    "thread" => Segment::Thread,
                    other => return Err(invalid(&format!("unknown placeholder `{}`", other))),
                };

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(segment);
            }
            '}' => return Err(invalid("unmatched `}`")),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: &'a DateTime<Utc>,
    level: Level,
    name: &'a str,
    message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a ErrorReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a str>,

    host: &'a str,
    process: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<&'a str>,

    #[serde(flatten)]
    fields: &'a Fields,
}

/// JSON 格式化器，字段平铺到顶层
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> Result<String, EmitError> {
        let line = JsonLine {
            timestamp: &record.timestamp,
            level: record.level,
            name: &record.name,
            message: record.render_message()?,
            exception: record.exception.as_ref(),
            stack: record.stack.as_deref(),
            host: &record.host,
            process: record.process,
            thread: record.thread.as_deref(),
            fields: &record.fields,
        };

        let json = if self.pretty {
            serde_json::to_string_pretty(&line)?
        } else {
            serde_json::to_string(&line)?
        };
        Ok(json)
    }
}
