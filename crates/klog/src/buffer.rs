//! 日志环形缓冲区
//!
//! 定长槽位，写满后覆盖最旧的条目并计入丢弃数。

use sync::SpinLock;

use crate::config::GLOBAL_LOG_BUFFER_SIZE;
use crate::entry::LogEntry;

struct Ring {
    slots: [LogEntry; GLOBAL_LOG_BUFFER_SIZE],
    /// 下一次读取的全局序号
    reader: usize,
    /// 下一次写入的全局序号
    writer: usize,
    dropped: usize,
}

/// 日志缓冲区
pub struct LogBuffer {
    ring: SpinLock<Ring>,
}

impl LogBuffer {
    /// 创建空缓冲区
    pub const fn new() -> Self {
        const EMPTY: LogEntry = LogEntry::empty();
        Self {
            ring: SpinLock::new(Ring {
                slots: [EMPTY; GLOBAL_LOG_BUFFER_SIZE],
                reader: 0,
                writer: 0,
                dropped: 0,
            }),
        }
    }

    /// 写入一条日志
    pub fn write(&self, entry: &LogEntry) {
        let mut ring = self.ring.lock();
        if ring.writer - ring.reader == GLOBAL_LOG_BUFFER_SIZE {
            ring.reader += 1;
            ring.dropped += 1;
        }
        let slot = ring.writer % GLOBAL_LOG_BUFFER_SIZE;
        ring.slots[slot] = entry.clone();
        ring.writer += 1;
    }

    /// 取出最旧的一条日志
    pub fn read(&self) -> Option<LogEntry> {
        let mut ring = self.ring.lock();
        if ring.reader == ring.writer {
            return None;
        }
        let slot = ring.reader % GLOBAL_LOG_BUFFER_SIZE;
        ring.reader += 1;
        Some(ring.slots[slot].clone())
    }

    /// 按全局序号查看日志，不移动读指针
    ///
    /// 已被覆盖或尚未写入的序号返回 None。
    pub fn peek(&self, index: usize) -> Option<LogEntry> {
        let ring = self.ring.lock();
        (ring.reader..ring.writer)
            .contains(&index)
            .then(|| ring.slots[index % GLOBAL_LOG_BUFFER_SIZE].clone())
    }

    /// 可读取的起始序号
    pub fn reader_index(&self) -> usize {
        self.ring.lock().reader
    }

    /// 下一次写入的序号
    pub fn writer_index(&self) -> usize {
        self.ring.lock().writer
    }

    /// 未读条目数
    pub fn len(&self) -> usize {
        let ring = self.ring.lock();
        ring.writer - ring.reader
    }

    /// 被覆盖的条目数
    pub fn dropped(&self) -> usize {
        self.ring.lock().dropped
    }
}
