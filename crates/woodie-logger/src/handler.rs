use crate::error::{ConfigError, EmitError};
use crate::formatter::Formatter;
use crate::level::Level;
use crate::record::LogRecord;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// 处理器：接收记录并输出到具体目的地
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// 处理器自身的阈值，低于该级别的记录不会交给它
    fn level(&self) -> Level;

    fn formatter(&self) -> Option<Arc<dyn Formatter>>;

    fn set_formatter(&self, formatter: Arc<dyn Formatter>);

    fn handle(&self, record: &LogRecord) -> Result<(), EmitError>;
}

/// 处理器公共状态：名称、阈值、格式化器槽位
pub struct HandlerCore {
    name: String,
    level: AtomicU32,
    formatter: RwLock<Option<Arc<dyn Formatter>>>,
}

impl HandlerCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: AtomicU32::new(Level::NOTSET.ordinal()),
            formatter: RwLock::new(None),
        }
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

    pub fn formatter(&self) -> Option<Arc<dyn Formatter>> {
        self.formatter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_formatter(&self, formatter: Arc<dyn Formatter>) {
        *self
            .formatter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(formatter);
    }

    pub fn format(&self, record: &LogRecord) -> Result<String, EmitError> {
        let formatter = self
            .formatter()
            .ok_or_else(|| EmitError::MissingFormatter(self.name.clone()))?;
        formatter.format(record)
    }
}

/// 处理器与可选格式化器的绑定
#[derive(Clone)]
pub struct HandlerBinding {
    pub handler: Arc<dyn Handler>,
    pub formatter: Option<Arc<dyn Formatter>>,
}

impl HandlerBinding {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            formatter: None,
        }
    }

    pub fn with_formatter(handler: Arc<dyn Handler>, formatter: Arc<dyn Formatter>) -> Self {
        Self {
            handler,
            formatter: Some(formatter),
        }
    }
}

impl From<Arc<dyn Handler>> for HandlerBinding {
    fn from(handler: Arc<dyn Handler>) -> Self {
        Self::new(handler)
    }
}

/// 流处理器：每条记录写一行并立即刷新
pub struct StreamHandler {
    core: HandlerCore,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StreamHandler {
    pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            core: HandlerCore::new(name),
            writer: Mutex::new(writer),
        }
    }

    pub fn stderr() -> Self {
        Self::new("stderr", Box::new(io::stderr()))
    }

    pub fn stdout() -> Self {
        Self::new("stdout", Box::new(io::stdout()))
    }

    pub fn with_level(self, level: Level) -> Self {
        self.core.set_level(level);
        self
    }

    pub fn with_formatter(self, formatter: Arc<dyn Formatter>) -> Self {
        self.core.set_formatter(formatter);
        self
    }

    pub fn set_level(&self, level: Level) {
        self.core.set_level(level);
    }
}

impl Handler for StreamHandler {
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
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// 文件处理器：以追加模式写入，不做轮转
pub struct FileHandler {
    core: HandlerCore,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileHandler {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ConfigError::OpenFile {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            core: HandlerCore::new(format!("file:{}", path.display())),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn with_level(self, level: Level) -> Self {
        self.core.set_level(level);
        self
    }

    pub fn with_formatter(self, formatter: Arc<dyn Formatter>) -> Self {
        self.core.set_formatter(formatter);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Handler for FileHandler {
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
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{JsonFormatter, TextFormatter};
    use tempfile::NamedTempFile;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_stream_handler_writes_line() {
        let buf = SharedBuf::default();
        let handler = StreamHandler::new("buf", Box::new(buf.clone()))
            .with_formatter(Arc::new(TextFormatter::new("{level} {message}").unwrap()));

        handler
            .handle(&LogRecord::new("svc", Level::WARN, "disk almost full"))
            .unwrap();

        assert_eq!(buf.contents(), "WARN disk almost full\n");
    }

    #[test]
    fn test_missing_formatter() {
        let handler = StreamHandler::new("bare", Box::new(SharedBuf::default()));
        let err = handler
            .handle(&LogRecord::new("svc", Level::INFO, "x"))
            .unwrap_err();

        assert!(matches!(err, EmitError::MissingFormatter(name) if name == "bare"));
    }

    #[test]
    fn test_handler_core_level_and_formatter() {
        let core = HandlerCore::new("core");
        assert_eq!(core.level(), Level::NOTSET);
        assert!(core.formatter().is_none());

        let formatter: Arc<dyn Formatter> = Arc::new(JsonFormatter::new());
        core.set_level(Level::ERROR);
        core.set_formatter(Arc::clone(&formatter));

        assert_eq!(core.level(), Level::ERROR);
        assert!(Arc::ptr_eq(&core.formatter().unwrap(), &formatter));
    }

    #[test]
    fn test_file_handler_appends() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        let handler = FileHandler::open(&path)
            .unwrap()
            .with_formatter(Arc::new(TextFormatter::new("{message}").unwrap()));

        handler.handle(&LogRecord::new("svc", Level::INFO, "Message 0")).unwrap();
        handler.handle(&LogRecord::new("svc", Level::INFO, "Message 1")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Message 0\nMessage 1\n");
        assert_eq!(handler.path(), path.as_path());
    }

    #[test]
    fn test_file_handler_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("app.log");

        assert!(matches!(
            FileHandler::open(&missing),
            Err(ConfigError::OpenFile { .. })
        ));
    }
}
