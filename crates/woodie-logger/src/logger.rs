use crate::error::{ConfigError, EmitError, FallbackOutcome, LogError};
use crate::failure::{FailureHook, FallbackRecord};
use crate::fields::{merge_fields, FieldStore, Fields};
use crate::formatter::{Formatter, TextFormatter};
use crate::handler::{Handler, HandlerBinding, StreamHandler};
use crate::level::{Level, LevelSpec};
use crate::record::ExcInfo;
use crate::sink::{Dispatcher, Emission, LogSink};
use serde_json::Value;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
enum ExcSetting {
    #[default]
    Unset,
    Off,
    On(ExcInfo),
}

/// 单次日志调用的附加参数
#[derive(Debug, Clone, Default)]
pub struct Call {
    args: Vec<Value>,
    exc: ExcSetting,
    stack_info: bool,
    extra: Option<Fields>,
    fields: Fields,
}

impl Call {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个 `%` 插值参数
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// 是否在派发时抓取异常调用栈
    pub fn exc_info(mut self, capture: bool) -> Self {
        self.exc = if capture {
            ExcSetting::On(ExcInfo::Capture)
        } else {
            ExcSetting::Off
        };
        self
    }

    /// 附带一个已捕获的错误
    pub fn error(mut self, error: &(dyn Error + 'static)) -> Self {
        self.exc = ExcSetting::On(ExcInfo::from_error(error));
        self
    }

    pub fn stack_info(mut self, capture: bool) -> Self {
        self.stack_info = capture;
        self
    }

    pub fn extra(mut self, extra: Fields) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    fn force_exc_info(mut self) -> Self {
        if self.exc == ExcSetting::Unset {
            self.exc = ExcSetting::On(ExcInfo::Capture);
        }
        self
    }
}

/// 带持久结构化字段的日志器
///
/// 每次调用依次合并持久字段、`extra`、调用字段（后者覆盖前者），
/// 再交给底层 [`LogSink`] 派发。派发失败时可选地先发一条兜底记录，
/// 然后把原始错误返回给调用方。
pub struct StructuredLogger {
    name: String,
    level: AtomicU32,
    fields: FieldStore,
    log_failure: bool,
    log_failure_level: Level,
    failure_hook: Arc<dyn FailureHook>,
    default_formatter: Arc<dyn Formatter>,
    default_handler: Arc<dyn Handler>,
    sink: Arc<dyn LogSink>,
}

impl StructuredLogger {
    pub fn builder(name: impl Into<String>) -> StructuredLoggerBuilder {
        StructuredLoggerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        Level::from_ordinal(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level.ordinal(), Ordering::Relaxed);
    }

    pub fn is_enabled_for(&self, level: Level) -> bool {
        level >= self.level()
    }

    /// 当前持久字段快照
    pub fn fields(&self) -> Arc<Fields> {
        self.fields.snapshot()
    }

    /// 合并持久字段，只影响之后的调用
    pub fn add_fields(&self, fields: Fields) {
        self.fields.extend(fields);
    }

    pub fn log_failure_enabled(&self) -> bool {
        self.log_failure
    }

    pub fn log_failure_level(&self) -> Level {
        self.log_failure_level
    }

    pub fn default_formatter(&self) -> &Arc<dyn Formatter> {
        &self.default_formatter
    }

    pub fn default_handler(&self) -> &Arc<dyn Handler> {
        &self.default_handler
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.sink.handlers()
    }

    /// 注册处理器；处理器已有格式化器时保持不变，
    /// 否则使用绑定的格式化器，再否则使用默认格式化器
    pub fn add_handler(&self, binding: impl Into<HandlerBinding>) -> bool {
        let HandlerBinding { handler, formatter } = binding.into();

        if handler.formatter().is_none() {
            let formatter = formatter.unwrap_or_else(|| Arc::clone(&self.default_formatter));
            handler.set_formatter(formatter);
        }

        let added = self.sink.add_handler(Arc::clone(&handler));
        if added {
            debug!(logger = %self.name, handler = handler.name(), "Registered handler");
        }
        added
    }

    pub fn debug(&self, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        self.log(Level::DEBUG, message, call)
    }

    pub fn info(&self, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        self.log(Level::INFO, message, call)
    }

    pub fn warn(&self, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        self.log(Level::WARN, message, call)
    }

    pub fn error(&self, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        self.log(Level::ERROR, message, call)
    }

    pub fn critical(&self, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        self.log(Level::CRITICAL, message, call)
    }

    /// 同 `error`，但默认附带异常调用栈
    pub fn exception(&self, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        self.error(message, call.force_exc_info())
    }

    pub fn log(&self, level: Level, message: impl Into<Value>, call: Call) -> Result<(), LogError> {
        if !self.is_enabled_for(level) {
            return Ok(());
        }

        let emission = self.prepare(level, message.into(), call);
        self.sink
            .emit(emission)
            .map_err(|error| self.handle_failure(error))
    }

    fn prepare(&self, level: Level, message: Value, call: Call) -> Emission {
        let Call {
            args,
            exc,
            stack_info,
            extra,
            fields: call_fields,
        } = call;

        let persistent = self.fields.snapshot();
        let extra = extra.unwrap_or_default();
        let fields = merge_fields([persistent.as_ref(), &extra, &call_fields]);

        Emission {
            level,
            message,
            args,
            exc_info: match exc {
                ExcSetting::On(exc_info) => Some(exc_info),
                ExcSetting::Unset | ExcSetting::Off => None,
            },
            stack_info,
            fields,
        }
    }

    fn handle_failure(&self, error: EmitError) -> LogError {
        if !self.log_failure {
            return LogError::new(&self.name, error, FallbackOutcome::Disabled);
        }

        let outcome = match self
            .failure_hook
            .on_failure(&self.name, self.sink.as_ref(), &error)
        {
            Ok(()) => FallbackOutcome::Emitted,
            Err(fallback_error) => {
                tracing::error!(
                    logger = %self.name,
                    error = %fallback_error,
                    "Fallback emission failed"
                );
                FallbackOutcome::Failed(fallback_error)
            }
        };

        LogError::new(&self.name, error, outcome)
    }
}

/// [`StructuredLogger`] 构建器
pub struct StructuredLoggerBuilder {
    name: String,
    level: LevelSpec,
    fields: Fields,
    log_failure: bool,
    log_failure_level: LevelSpec,
    bindings: Vec<HandlerBinding>,
    default_formatter: Option<Arc<dyn Formatter>>,
    default_handler: Option<Arc<dyn Handler>>,
    failure_hook: Option<Arc<dyn FailureHook>>,
    sink: Option<Arc<dyn LogSink>>,
}

impl StructuredLoggerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: LevelSpec::Level(Level::INFO),
            fields: Fields::new(),
            log_failure: true,
            log_failure_level: LevelSpec::Level(Level::ERROR),
            bindings: Vec::new(),
            default_formatter: None,
            default_handler: None,
            failure_hook: None,
            sink: None,
        }
    }

    pub fn level(mut self, level: impl Into<LevelSpec>) -> Self {
        self.level = level.into();
        self
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn log_failure(mut self, enabled: bool) -> Self {
        self.log_failure = enabled;
        self
    }

    pub fn log_failure_level(mut self, level: impl Into<LevelSpec>) -> Self {
        self.log_failure_level = level.into();
        self
    }

    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.bindings.push(HandlerBinding::new(handler));
        self
    }

    pub fn handler_with_formatter(mut self, handler: Arc<dyn Handler>, formatter: Arc<dyn Formatter>) -> Self {
        self.bindings.push(HandlerBinding::with_formatter(handler, formatter));
        self
    }

    pub fn handlers(mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) -> Self {
        self.bindings.extend(handlers.into_iter().map(HandlerBinding::new));
        self
    }

    pub fn bindings(mut self, bindings: impl IntoIterator<Item = HandlerBinding>) -> Self {
        self.bindings.extend(bindings);
        self
    }

    pub fn default_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.default_formatter = Some(formatter);
        self
    }

    pub fn default_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    /// 替换默认的兜底记录钩子
    pub fn failure_hook(mut self, hook: Arc<dyn FailureHook>) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    /// 使用自定义 sink 替代内置 [`Dispatcher`]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<StructuredLogger, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let level = self.level.resolve()?;
        let log_failure_level = self.log_failure_level.resolve()?;

        let default_formatter = self
            .default_formatter
            .unwrap_or_else(|| Arc::new(TextFormatter::default()));
        let default_handler = self
            .default_handler
            .unwrap_or_else(|| Arc::new(StreamHandler::stderr()));
        let failure_hook = self
            .failure_hook
            .unwrap_or_else(|| Arc::new(FallbackRecord::new(log_failure_level)));
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(Dispatcher::new(self.name.clone())));

        let logger = StructuredLogger {
            name: self.name,
            level: AtomicU32::new(level.ordinal()),
            fields: FieldStore::new(self.fields),
            log_failure: self.log_failure,
            log_failure_level,
            failure_hook,
            default_formatter,
            default_handler,
            sink,
        };

        let bindings = if self.bindings.is_empty() {
            vec![HandlerBinding::new(Arc::clone(&logger.default_handler))]
        } else {
            self.bindings
        };

        for binding in bindings {
            logger.add_handler(binding);
        }

        Ok(logger)
    }
}
