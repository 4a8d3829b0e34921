//! 日志系统核心实现
//!
//! 所有日志状态封装在 `LogCore` 中，全局实例之外也可以独立实例化用于测试。

use alloc::string::String;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::buffer::LogBuffer;
use crate::config::{DEFAULT_CONSOLE_LEVEL, DEFAULT_LOG_LEVEL};
use crate::entry::LogEntry;
use crate::level::LogLevel;

/// 核心日志系统
///
/// 封装了环形缓冲区和两级过滤阈值：
/// - `global_level`：达到此级别的日志进入缓冲区
/// - `console_level`：达到此级别的日志同时立即打印
pub struct LogCore {
    buffer: LogBuffer,
    global_level: AtomicU8,
    console_level: AtomicU8,
}

impl LogCore {
    /// 使用默认日志级别创建实例（Info 缓冲，Warning 打印）
    pub const fn default() -> Self {
        Self {
            buffer: LogBuffer::new(),
            global_level: AtomicU8::new(DEFAULT_LOG_LEVEL as u8),
            console_level: AtomicU8::new(DEFAULT_CONSOLE_LEVEL as u8),
        }
    }

    /// 使用自定义日志级别创建实例
    pub const fn new(global_level: LogLevel, console_level: LogLevel) -> Self {
        Self {
            buffer: LogBuffer::new(),
            global_level: AtomicU8::new(global_level as u8),
            console_level: AtomicU8::new(console_level as u8),
        }
    }

    /// 记录一条日志
    pub fn _log(&self, level: LogLevel, args: fmt::Arguments) {
        if !self.is_level_enabled(level) {
            return;
        }

        let (cpu_id, task_id, timestamp) = match crate::get_context_provider() {
            Some(provider) => (provider.cpu_id(), provider.task_id(), provider.timestamp()),
            None => (0, 0, 0),
        };

        let entry = LogEntry::from_args(level, cpu_id, task_id, timestamp, args);
        self.buffer.write(&entry);

        if self.is_console_level(level) {
            if let Some(output) = crate::get_log_output() {
                output.write_str(&format_log_entry(&entry));
                output.write_str("\n");
            }
        }
    }

    /// 读取并移除最旧的一条日志
    pub fn _read_log(&self) -> Option<LogEntry> {
        self.buffer.read()
    }

    /// 按序号查看日志，不移动读指针
    pub fn _peek_log(&self, index: usize) -> Option<LogEntry> {
        self.buffer.peek(index)
    }

    /// 可读取的起始序号
    pub fn _log_reader_index(&self) -> usize {
        self.buffer.reader_index()
    }

    /// 下一次写入的序号
    pub fn _log_writer_index(&self) -> usize {
        self.buffer.writer_index()
    }

    /// 未读条目数
    pub fn _log_len(&self) -> usize {
        self.buffer.len()
    }

    /// 被覆盖的条目数
    pub fn _log_dropped_count(&self) -> usize {
        self.buffer.dropped()
    }

    /// 设置缓冲级别
    pub fn _set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Release);
    }

    /// 当前缓冲级别
    pub fn _get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Acquire)).unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// 设置控制台级别
    pub fn _set_console_level(&self, level: LogLevel) {
        self.console_level.store(level as u8, Ordering::Release);
    }

    /// 当前控制台级别
    pub fn _get_console_level(&self) -> LogLevel {
        LogLevel::from_u8(self.console_level.load(Ordering::Acquire))
            .unwrap_or(DEFAULT_CONSOLE_LEVEL)
    }

    #[inline(always)]
    pub(crate) fn is_level_enabled(&self, level: LogLevel) -> bool {
        level as u8 <= self.global_level.load(Ordering::Acquire)
    }

    #[inline(always)]
    fn is_console_level(&self, level: LogLevel) -> bool {
        level as u8 <= self.console_level.load(Ordering::Acquire)
    }
}

/// 格式化日志条目（带 ANSI 颜色和上下文信息）
///
/// # 格式
/// ```text
/// <color_code>[LEVEL] [timestamp] [CPU<id>/T<tid>] message<reset>
/// ```
pub fn format_log_entry(entry: &LogEntry) -> String {
    alloc::format!(
        "{}{} [{:12}] [CPU{}/T{:3}] {}{}",
        entry.level().color_code(),
        entry.level().as_str(),
        entry.timestamp(),
        entry.cpu_id(),
        entry.task_id(),
        entry.message(),
        entry.level().reset_color_code()
    )
}
