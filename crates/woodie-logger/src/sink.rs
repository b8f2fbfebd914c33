use crate::error::EmitError;
use crate::fields::Fields;
use crate::handler::Handler;
use crate::level::Level;
use crate::record::{ExcInfo, LogRecord};
use serde_json::Value;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

/// 记录对象自身的属性名，字段不得覆盖
pub const RESERVED_FIELDS: &[&str] = &[
    "name",
    "message",
    "msg",
    "args",
    "level",
    "levelname",
    "levelno",
    "timestamp",
    "exception",
    "stack",
    "host",
    "process",
    "thread",
];

/// 一次派发请求
#[derive(Debug, Clone)]
pub struct Emission {
    pub level: Level,
    pub message: Value,
    pub args: Vec<Value>,
    pub exc_info: Option<ExcInfo>,
    pub stack_info: bool,
    pub fields: Fields,
}

impl Emission {
    pub fn new(level: Level, message: impl Into<Value>) -> Self {
        Self {
            level,
            message: message.into(),
            args: Vec::new(),
            exc_info: None,
            stack_info: false,
            fields: Fields::new(),
        }
    }
}

/// 记录派发接口
pub trait LogSink: Send + Sync {
    fn name(&self) -> &str;

    fn emit(&self, emission: Emission) -> Result<(), EmitError>;

    /// 注册处理器；同一个处理器只注册一次，返回是否新增
    fn add_handler(&self, handler: Arc<dyn Handler>) -> bool;

    fn handlers(&self) -> Vec<Arc<dyn Handler>>;
}

/// 默认派发器
pub struct Dispatcher {
    name: String,
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
}

impl Dispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn remove_handler(&self, handler: &Arc<dyn Handler>) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    fn make_record(&self, emission: Emission) -> Result<LogRecord, EmitError> {
        if let Some(key) = emission
            .fields
            .keys()
            .find(|key| RESERVED_FIELDS.contains(&key.as_str()))
        {
            return Err(EmitError::ReservedField(key.clone()));
        }

        let mut record = LogRecord::new(&self.name, emission.level, emission.message)
            .with_args(emission.args)
            .with_fields(emission.fields);

        if let Some(exc_info) = emission.exc_info {
            record = record.with_exception(exc_info.resolve());
        }
        if emission.stack_info {
            record = record.with_stack(Backtrace::force_capture().to_string());
        }
        Ok(record)
    }
}

impl LogSink for Dispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit(&self, emission: Emission) -> Result<(), EmitError> {
        let record = self.make_record(emission)?;
        let handlers = self.handlers();

        let mut first_error = None;
        for handler in handlers.iter().filter(|h| record.level >= h.level()) {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&record)))
                .unwrap_or_else(|payload| {
                    Err(EmitError::HandlerPanicked {
                        handler: handler.name().to_string(),
                        message: panic_message(payload.as_ref()),
                    })
                });

            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn add_handler(&self, handler: Arc<dyn Handler>) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        handlers.push(handler);
        true
    }

    fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::formatter::Formatter;
    use serde_json::json;
    use std::sync::Mutex;

    /// 记录收到的内容
    #[derive(Default)]
    struct Capture {
        level: Option<Level>,
        records: Mutex<Vec<LogRecord>>,
    }

    impl Handler for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        fn level(&self) -> Level {
            self.level.unwrap_or(Level::NOTSET)
        }

        fn formatter(&self) -> Option<Arc<dyn Formatter>> {
            None
        }

        fn set_formatter(&self, _formatter: Arc<dyn Formatter>) {}

        fn handle(&self, record: &LogRecord) -> Result<(), EmitError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Panicking;

    impl Handler for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn level(&self) -> Level {
            Level::NOTSET
        }

        fn formatter(&self) -> Option<Arc<dyn Formatter>> {
            None
        }

        fn set_formatter(&self, _formatter: Arc<dyn Formatter>) {}

        fn handle(&self, _record: &LogRecord) -> Result<(), EmitError> {
            panic!("handler exploded");
        }
    }

    #[test]
    fn test_emit_builds_record() {
        let dispatcher = Dispatcher::new("svc");
        let capture = Arc::new(Capture::default());
        dispatcher.add_handler(capture.clone());

        let mut emission = Emission::new(Level::INFO, "user %s");
        emission.args = vec![json!("alice")];
        emission.fields = fields! { "env" => "prod" };
        dispatcher.emit(emission).unwrap();

        let records = capture.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "svc");
        assert_eq!(records[0].render_message().unwrap(), "user alice");
        assert_eq!(records[0].fields["env"], json!("prod"));
        assert!(records[0].exception.is_none());
        assert!(records[0].stack.is_none());
    }

    #[test]
    fn test_handler_threshold() {
        let dispatcher = Dispatcher::new("svc");
        let errors_only = Arc::new(Capture {
            level: Some(Level::ERROR),
            ..Default::default()
        });
        dispatcher.add_handler(errors_only.clone());

        dispatcher.emit(Emission::new(Level::WARN, "skipped")).unwrap();
        dispatcher.emit(Emission::new(Level::ERROR, "kept")).unwrap();

        let records = errors_only.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, json!("kept"));
    }

    #[test]
    fn test_add_handler_is_idempotent() {
        let dispatcher = Dispatcher::new("svc");
        let capture: Arc<dyn Handler> = Arc::new(Capture::default());

        assert!(dispatcher.add_handler(Arc::clone(&capture)));
        assert!(!dispatcher.add_handler(Arc::clone(&capture)));
        assert_eq!(dispatcher.handlers().len(), 1);

        assert!(dispatcher.remove_handler(&capture));
        assert!(dispatcher.handlers().is_empty());
    }

    #[test]
    fn test_reserved_field_rejected() {
        let dispatcher = Dispatcher::new("svc");
        let mut emission = Emission::new(Level::INFO, "x");
        emission.fields = fields! { "message" => "clash" };

        assert!(matches!(
            dispatcher.emit(emission),
            Err(EmitError::ReservedField(key)) if key == "message"
        ));
    }

    #[test]
    fn test_panic_is_contained_and_later_handlers_run() {
        let dispatcher = Dispatcher::new("svc");
        let capture = Arc::new(Capture::default());
        dispatcher.add_handler(Arc::new(Panicking));
        dispatcher.add_handler(capture.clone());

        let err = dispatcher.emit(Emission::new(Level::INFO, "x")).unwrap_err();

        assert!(matches!(
            err,
            EmitError::HandlerPanicked { ref handler, ref message }
                if handler == "panicking" && message == "handler exploded"
        ));
        assert_eq!(capture.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_exception_and_stack_capture() {
        let dispatcher = Dispatcher::new("svc");
        let capture = Arc::new(Capture::default());
        dispatcher.add_handler(capture.clone());

        let mut emission = Emission::new(Level::ERROR, "x");
        emission.exc_info = Some(ExcInfo::Capture);
        emission.stack_info = true;
        dispatcher.emit(emission).unwrap();

        let records = capture.records.lock().unwrap();
        assert!(records[0].exception.as_ref().unwrap().backtrace.is_some());
        assert!(records[0].stack.is_some());
    }

    #[test]
    fn test_no_handlers_is_silent() {
        let dispatcher = Dispatcher::new("svc");
        assert!(dispatcher.emit(Emission::new(Level::CRITICAL, "x")).is_ok());
    }
}
