pub mod config;
pub mod error;
pub mod failure;
pub mod fields;
pub mod formatter;
pub mod handler;
mod interpolate;
pub mod level;
pub mod logger;
pub mod record;
pub mod sink;
pub mod tracing_bridge;

pub use config::{ConfigLoader, FormatterConfig, HandlerConfig, HandlerKind, LoggerConfig};
pub use error::{ConfigError, EmitError, FallbackOutcome, LogError};
pub use failure::{FailureHook, FallbackRecord};
pub use fields::{merge_fields, FieldStore, Fields};
pub use formatter::{Formatter, JsonFormatter, TextFormatter};
pub use handler::{FileHandler, Handler, HandlerBinding, HandlerCore, StreamHandler};
pub use level::{Level, LevelSpec};
pub use logger::{Call, StructuredLogger, StructuredLoggerBuilder};
pub use record::{ErrorReport, ExcInfo, LogRecord};
pub use sink::{Dispatcher, Emission, LogSink};
pub use tracing_bridge::{init_tracing, TracingConfig, TracingError, TracingHandler};

#[doc(hidden)]
pub use serde_json as __serde_json;
