use crate::error::EmitError;
use crate::level::Level;
use crate::record::ExcInfo;
use crate::sink::{Emission, LogSink};

/// 记录派发失败后的钩子，每次失败只调用一次
///
/// 钩子自身的错误由调用方隔离，不会覆盖原始错误。
pub trait FailureHook: Send + Sync {
    fn on_failure(&self, logger: &str, sink: &dyn LogSink, error: &EmitError) -> Result<(), EmitError>;
}

/// 默认钩子：以固定消息直接向 sink 派发一条兜底记录，
/// 原始错误作为异常信息附带，不合并任何字段
#[derive(Debug, Clone)]
pub struct FallbackRecord {
    level: Level,
}

impl FallbackRecord {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(logger: &str) -> String {
        format!("Logger `{}` failed to log.", logger)
    }
}

impl FailureHook for FallbackRecord {
    fn on_failure(&self, logger: &str, sink: &dyn LogSink, error: &EmitError) -> Result<(), EmitError> {
        let mut emission = Emission::new(self.level, Self::message(logger));
        emission.exc_info = Some(ExcInfo::from_error(error));
        sink.emit(emission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::record::ErrorReport;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        emissions: Mutex<Vec<Emission>>,
    }

    impl LogSink for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn emit(&self, emission: Emission) -> Result<(), EmitError> {
            self.emissions.lock().unwrap().push(emission);
            Ok(())
        }

        fn add_handler(&self, _handler: Arc<dyn Handler>) -> bool {
            false
        }

        fn handlers(&self) -> Vec<Arc<dyn Handler>> {
            Vec::new()
        }
    }

    #[test]
    fn test_fallback_record_contents() {
        let sink = Recording::default();
        let hook = FallbackRecord::new(Level::CRITICAL);
        let original = EmitError::Format("not enough arguments for format string".to_string());

        hook.on_failure("svc", &sink, &original).unwrap();

        let emissions = sink.emissions.lock().unwrap();
        assert_eq!(emissions.len(), 1);

        let fallback = &emissions[0];
        assert_eq!(fallback.level, Level::CRITICAL);
        assert_eq!(fallback.message, "Logger `svc` failed to log.");
        assert!(fallback.fields.is_empty());
        assert_eq!(
            fallback.exc_info,
            Some(ExcInfo::Report(ErrorReport::from_error(&original)))
        );
    }
}
