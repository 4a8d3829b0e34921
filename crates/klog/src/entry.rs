//! 日志条目

use core::fmt::{self, Write};

use crate::config::MAX_LOG_MESSAGE_LENGTH;
use crate::level::LogLevel;

/// 单条日志，消息存放在定长数组中，不需要堆分配
#[derive(Clone)]
pub struct LogEntry {
    level: LogLevel,
    cpu_id: usize,
    task_id: u32,
    timestamp: usize,
    len: usize,
    message: [u8; MAX_LOG_MESSAGE_LENGTH],
}

impl LogEntry {
    /// 空条目，用于初始化缓冲区槽位
    pub const fn empty() -> Self {
        Self {
            level: LogLevel::Debug,
            cpu_id: 0,
            task_id: 0,
            timestamp: 0,
            len: 0,
            message: [0; MAX_LOG_MESSAGE_LENGTH],
        }
    }

    /// 由格式化参数构造条目，超长消息在字符边界处截断
    pub fn from_args(
        level: LogLevel,
        cpu_id: usize,
        task_id: u32,
        timestamp: usize,
        args: fmt::Arguments,
    ) -> Self {
        let mut entry = Self {
            level,
            cpu_id,
            task_id,
            timestamp,
            ..Self::empty()
        };
        let mut writer = MessageWriter { entry: &mut entry };
        // 截断不是错误，忽略写满后的 fmt::Error
        let _ = writer.write_fmt(args);
        entry
    }

    /// 日志级别
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// 产生日志的 CPU
    pub fn cpu_id(&self) -> usize {
        self.cpu_id
    }

    /// 产生日志的任务
    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    /// 时间戳
    pub fn timestamp(&self) -> usize {
        self.timestamp
    }

    /// 消息文本
    pub fn message(&self) -> &str {
        // MessageWriter 只在字符边界处截断
        core::str::from_utf8(&self.message[..self.len]).unwrap_or("")
    }
}

struct MessageWriter<'a> {
    entry: &'a mut LogEntry,
}

impl Write for MessageWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = MAX_LOG_MESSAGE_LENGTH - self.entry.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        let start = self.entry.len;
        self.entry.message[start..start + take].copy_from_slice(&s.as_bytes()[..take]);
        self.entry.len += take;
        if take < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}
