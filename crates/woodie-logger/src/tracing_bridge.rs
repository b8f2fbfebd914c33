use crate::error::EmitError;
use crate::formatter::Formatter;
use crate::handler::{Handler, HandlerCore};
use crate::level::Level;
use crate::record::LogRecord;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    InitError(String),
}

/// tracing 订阅器配置
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `RUST_LOG` 未设置时使用的过滤规则
    pub default_filter: String,
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
        }
    }
}

/// 安装全局 tracing 订阅器
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let result = if config.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| TracingError::InitError(e.to_string()))
}

/// 把记录转发进 tracing 生态，由应用安装的订阅器负责输出
pub struct TracingHandler {
    core: HandlerCore,
}

impl TracingHandler {
    pub fn new() -> Self {
        Self {
            core: HandlerCore::new("tracing"),
        }
    }

    pub fn with_level(self, level: Level) -> Self {
        self.core.set_level(level);
        self
    }

    pub fn with_formatter(self, formatter: Arc<dyn Formatter>) -> Self {
        self.core.set_formatter(formatter);
        self
    }
}

impl Default for TracingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for TracingHandler {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn level(&self) -> Level {
        self.core.level()
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter>> {
        self.core.formatter()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter>) {
        self.core.set_formatter(formatter);
    }

    fn handle(&self, record: &LogRecord) -> Result<(), EmitError> {
        let line = self.core.format(record)?;
        let logger = record.name.as_str();

        match record.level.to_tracing() {
            tracing::Level::ERROR => tracing::error!(target: "woodie", logger, "{}", line),
            tracing::Level::WARN => tracing::warn!(target: "woodie", logger, "{}", line),
            tracing::Level::INFO => tracing::info!(target: "woodie", logger, "{}", line),
            tracing::Level::DEBUG => tracing::debug!(target: "woodie", logger, "{}", line),
            tracing::Level::TRACE => tracing::trace!(target: "woodie", logger, "{}", line),
        }
        Ok(())
    }
}
