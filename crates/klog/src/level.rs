//! 日志级别定义

/// 日志级别，数值越小越严重（与 syslog 一致）
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// 系统不可用
    Emergency = 0,
    /// 必须立即处理
    Alert = 1,
    /// 严重错误
    Critical = 2,
    /// 错误
    Error = 3,
    /// 警告
    Warning = 4,
    /// 正常但值得注意
    Notice = 5,
    /// 信息
    Info = 6,
    /// 调试
    Debug = 7,
}

impl LogLevel {
    /// 由数值构造，越界时返回 None
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Emergency,
            1 => Self::Alert,
            2 => Self::Critical,
            3 => Self::Error,
            4 => Self::Warning,
            5 => Self::Notice,
            6 => Self::Info,
            7 => Self::Debug,
            _ => return None,
        })
    }

    /// 输出时使用的级别标签
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "[EMERG]",
            Self::Alert => "[ALERT]",
            Self::Critical => "[CRIT]",
            Self::Error => "[ERR]",
            Self::Warning => "[WARNING]",
            Self::Notice => "[NOTICE]",
            Self::Info => "[INFO]",
            Self::Debug => "[DEBUG]",
        }
    }

    /// ANSI 颜色前缀
    pub const fn color_code(self) -> &'static str {
        match self {
            Self::Emergency | Self::Alert | Self::Critical => "\x1b[1;31m",
            Self::Error => "\x1b[31m",
            Self::Warning => "\x1b[33m",
            Self::Notice => "\x1b[32m",
            Self::Info => "\x1b[37m",
            Self::Debug => "\x1b[90m",
        }
    }

    /// ANSI 颜色复位
    pub const fn reset_color_code(self) -> &'static str {
        "\x1b[0m"
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warning,
            log::Level::Info => Self::Info,
            log::Level::Debug | log::Level::Trace => Self::Debug,
        }
    }
}
