use serde_json::json;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use woodie_logger::{
    fields, Call, EmitError, FallbackOutcome, FileHandler, Formatter, Handler, HandlerBinding,
    HandlerCore, JsonFormatter, Level, LogRecord, StructuredLogger, TextFormatter,
};

/// 保存收到的记录与格式化结果
struct CaptureHandler {
    core: HandlerCore,
    records: Mutex<Vec<(LogRecord, String)>>,
}

impl CaptureHandler {
    fn new(name: &str) -> Self {
        Self {
            core: HandlerCore::new(name),
            records: Mutex::new(Vec::new()),
        }
    }

    fn with_level(self, level: Level) -> Self {
        self.core.set_level(level);
        self
    }

    fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(record, _)| record.clone())
            .collect()
    }

    fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl Handler for CaptureHandler {
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
        self.records.lock().unwrap().push((record.clone(), line));
        Ok(())
    }
}

/// 只对普通记录失败，兜底记录照常接收
struct FlakyHandler {
    core: HandlerCore,
    received: Mutex<Vec<LogRecord>>,
}

impl FlakyHandler {
    fn new() -> Self {
        Self {
            core: HandlerCore::new("flaky"),
            received: Mutex::new(Vec::new()),
        }
    }
}

impl Handler for FlakyHandler {
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
        self.received.lock().unwrap().push(record.clone());
        if record.exception.is_none() {
            return Err(EmitError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "socket closed",
            )));
        }
        Ok(())
    }
}

#[test]
fn test_info_with_extra_reaches_handler() {
    let capture = Arc::new(CaptureHandler::new("capture"));
    let logger = StructuredLogger::builder("svc")
        .fields(fields! { "env" => "prod" })
        .handler(capture.clone())
        .build()
        .unwrap();

    logger
        .info("started", Call::new().extra(fields! { "pid" => 123 }))
        .unwrap();

    let records = capture.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::INFO);
    assert_eq!(records[0].message, json!("started"));
    assert_eq!(records[0].fields, fields! { "env" => "prod", "pid" => 123 });
}

#[test]
fn test_failing_handler_triggers_fallback_then_error() {
    let flaky = Arc::new(FlakyHandler::new());
    let logger = StructuredLogger::builder("svc")
        .log_failure_level(Level::CRITICAL)
        .handler(flaky.clone())
        .build()
        .unwrap();

    let err = logger.error("x", Call::new()).unwrap_err();

    assert!(matches!(err.emit_error(), EmitError::Io(_)));
    assert!(matches!(err.fallback(), FallbackOutcome::Emitted));
    assert!(err.to_string().contains("svc"));

    let received = flaky.received.lock().unwrap();
    assert_eq!(received.len(), 2);

    let fallback = &received[1];
    assert_eq!(fallback.level, Level::CRITICAL);
    assert!(fallback.render_message().unwrap().contains("`svc`"));
    assert!(fallback
        .exception
        .as_ref()
        .unwrap()
        .message
        .contains("socket closed"));
}

#[test]
fn test_failing_handler_without_guard() {
    let flaky = Arc::new(FlakyHandler::new());
    let logger = StructuredLogger::builder("svc")
        .log_failure(false)
        .handler(flaky.clone())
        .build()
        .unwrap();

    let err = logger.error("x", Call::new()).unwrap_err();

    assert!(matches!(err.fallback(), FallbackOutcome::Disabled));
    assert_eq!(flaky.received.lock().unwrap().len(), 1);
}

#[test]
fn test_formatter_resolution() {
    let preset: Arc<dyn Formatter> = Arc::new(JsonFormatter::new());
    let explicit: Arc<dyn Formatter> = Arc::new(TextFormatter::new("{message}").unwrap());
    let default: Arc<dyn Formatter> = Arc::new(TextFormatter::new("{level}").unwrap());

    let with_preset = Arc::new(CaptureHandler::new("preset"));
    with_preset.set_formatter(Arc::clone(&preset));
    let with_explicit = Arc::new(CaptureHandler::new("explicit"));
    let bare = Arc::new(CaptureHandler::new("bare"));

    let _logger = StructuredLogger::builder("svc")
        .default_formatter(Arc::clone(&default))
        .bindings([
            HandlerBinding::with_formatter(with_preset.clone(), Arc::clone(&explicit)),
            HandlerBinding::with_formatter(with_explicit.clone(), Arc::clone(&explicit)),
            HandlerBinding::new(bare.clone()),
        ])
        .build()
        .unwrap();

    assert!(Arc::ptr_eq(&with_preset.formatter().unwrap(), &preset));
    assert!(Arc::ptr_eq(&with_explicit.formatter().unwrap(), &explicit));
    assert!(Arc::ptr_eq(&bare.formatter().unwrap(), &default));
}

#[test]
fn test_duplicate_handler_registered_once() {
    let capture = Arc::new(CaptureHandler::new("capture"));
    let logger = StructuredLogger::builder("svc")
        .handlers([
            capture.clone() as Arc<dyn Handler>,
            capture.clone() as Arc<dyn Handler>,
        ])
        .build()
        .unwrap();

    logger.info("once", Call::new()).unwrap();

    assert_eq!(logger.handlers().len(), 1);
    assert_eq!(capture.records().len(), 1);
}

#[test]
fn test_handler_thresholds() {
    let all = Arc::new(CaptureHandler::new("all"));
    let errors = Arc::new(CaptureHandler::new("errors").with_level(Level::ERROR));
    let logger = StructuredLogger::builder("svc")
        .level(Level::DEBUG)
        .handler(all.clone())
        .handler(errors.clone())
        .build()
        .unwrap();

    logger.debug("d", Call::new()).unwrap();
    logger.warn("w", Call::new()).unwrap();
    logger.critical("c", Call::new()).unwrap();

    assert_eq!(all.records().len(), 3);
    assert_eq!(errors.records().len(), 1);
    assert_eq!(errors.records()[0].level, Level::CRITICAL);
}

#[test]
fn test_reserved_field_triggers_fallback() {
    let capture = Arc::new(CaptureHandler::new("capture"));
    let logger = StructuredLogger::builder("svc")
        .handler(capture.clone())
        .build()
        .unwrap();

    let err = logger
        .info("x", Call::new().field("message", "clash"))
        .unwrap_err();

    assert!(matches!(err.emit_error(), EmitError::ReservedField(key) if key == "message"));
    assert!(err.fallback().is_emitted());

    let records = capture.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::ERROR);
    assert!(records[0].fields.is_empty());
}

#[test]
fn test_text_output_includes_fields() {
    let capture = Arc::new(CaptureHandler::new("capture"));
    let logger = StructuredLogger::builder("orders")
        .fields(fields! { "env" => "prod" })
        .handler_with_formatter(
            capture.clone(),
            Arc::new(TextFormatter::new("{level} {name}: {message} {fields}").unwrap()),
        )
        .build()
        .unwrap();

    logger
        .warn("order %s delayed", Call::new().arg("A-17").field("minutes", 12))
        .unwrap();

    assert_eq!(
        capture.lines(),
        vec!["WARN orders: order A-17 delayed env=prod minutes=12".to_string()]
    );
}

#[test]
fn test_file_handler_json_lines() {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let logger = StructuredLogger::builder("svc")
        .fields(fields! { "env" => "prod" })
        .handler_with_formatter(
            Arc::new(FileHandler::open(&path).unwrap()),
            Arc::new(JsonFormatter::new()),
        )
        .build()
        .unwrap();

    logger.info("Message 0", Call::new()).unwrap();
    logger
        .error("Message 1", Call::new().field("attempt", 2))
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["message"], "Message 0");
    assert_eq!(lines[0]["env"], "prod");
    assert_eq!(lines[1]["level"], "ERROR");
    assert_eq!(lines[1]["attempt"], 2);
}

#[test]
fn test_concurrent_add_fields_and_log() {
    let capture = Arc::new(CaptureHandler::new("capture"));
    let logger = Arc::new(
        StructuredLogger::builder("svc")
            .fields(fields! { "base" => true })
            .handler(capture.clone())
            .build()
            .unwrap(),
    );

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for j in 0..25 {
                    logger.add_fields(fields! { format!("w{}", i) => j });
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for _ in 0..25 {
                    logger.info("tick", Call::new()).unwrap();
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(capture.records().len(), 100);
    assert!(capture.records().iter().all(|r| r.fields["base"] == json!(true)));

    let fields = logger.fields();
    for i in 0..4 {
        assert_eq!(fields[&format!("w{}", i)], json!(24));
    }
}
