use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 日志级别，序数越大越严重
///
/// 任意序数都合法（例如 25 位于 INFO 与 WARN 之间），
/// 具名常量只是常用刻度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u32);

impl Level {
    pub const NOTSET: Level = Level(0);
    pub const DEBUG: Level = Level(10);
    pub const INFO: Level = Level(20);
    pub const WARN: Level = Level(30);
    pub const ERROR: Level = Level(40);
    pub const CRITICAL: Level = Level(50);

    pub const fn from_ordinal(ordinal: u32) -> Self {
        Level(ordinal)
    }

    pub const fn ordinal(self) -> u32 {
        self.0
    }

    /// 具名级别的名称
    pub fn name(self) -> Option<&'static str> {
        match self {
            Level::NOTSET => Some("NOTSET"),
            Level::DEBUG => Some("DEBUG"),
            Level::INFO => Some("INFO"),
            Level::WARN => Some("WARN"),
            Level::ERROR => Some("ERROR"),
            Level::CRITICAL => Some("CRITICAL"),
            _ => None,
        }
    }

    /// 映射到 tracing 的五个级别（向下取整）
    pub fn to_tracing(self) -> tracing::Level {
        if self >= Level::ERROR {
            tracing::Level::ERROR
        } else if self >= Level::WARN {
            tracing::Level::WARN
        } else if self >= Level::INFO {
            tracing::Level::INFO
        } else if self >= Level::DEBUG {
            tracing::Level::DEBUG
        } else {
            tracing::Level::TRACE
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level(5),
            tracing::Level::DEBUG => Level::DEBUG,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::ERROR => Level::ERROR,
        }
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(ordinal) = trimmed.parse::<u32>() {
            return Ok(Level(ordinal));
        }

        match trimmed.to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(Level::NOTSET),
            "DEBUG" => Ok(Level::DEBUG),
            "INFO" => Ok(Level::INFO),
            "WARN" | "WARNING" => Ok(Level::WARN),
            "ERROR" => Ok(Level::ERROR),
            "CRITICAL" | "FATAL" => Ok(Level::CRITICAL),
            _ => Err(ConfigError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.pad(name),
            None => f.pad(&format!("Level {}", self.0)),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_u32(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl<'de> de::Visitor<'de> for LevelVisitor {
            type Value = Level;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a level name or a non-negative ordinal")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Level, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Level, E> {
                u32::try_from(v)
                    .map(Level)
                    .map_err(|_| E::custom(format!("level ordinal {} out of range", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Level, E> {
                u32::try_from(v)
                    .map(Level)
                    .map_err(|_| E::custom(format!("level ordinal {} out of range", v)))
            }
        }

        deserializer.deserialize_any(LevelVisitor)
    }
}

/// 构造参数中的级别：既可以是级别本身，也可以是待解析的名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelSpec {
    Level(Level),
    Name(String),
}

impl LevelSpec {
    pub fn resolve(&self) -> Result<Level, ConfigError> {
        match self {
            LevelSpec::Level(level) => Ok(*level),
            LevelSpec::Name(name) => name.parse(),
        }
    }
}

impl From<Level> for LevelSpec {
    fn from(level: Level) -> Self {
        LevelSpec::Level(level)
    }
}

impl From<u32> for LevelSpec {
    fn from(ordinal: u32) -> Self {
        LevelSpec::Level(Level(ordinal))
    }
}

impl From<&str> for LevelSpec {
    fn from(name: &str) -> Self {
        LevelSpec::Name(name.to_string())
    }
}

impl From<String> for LevelSpec {
    fn from(name: String) -> Self {
        LevelSpec::Name(name)
    }
}
