//! 任务子系统相关操作的 Mock 实现
//!
//! `task` crate 在 `cfg(test)` 下为这些类型实现 `TaskOps`。

use core::sync::atomic::{AtomicUsize, Ordering};

/// Mock 的任务操作：记录发送的 IPI 与让出次数
pub struct MockTaskOps {
    ipis: AtomicUsize,
    yields: AtomicUsize,
}

impl MockTaskOps {
    pub const fn new() -> Self {
        Self {
            ipis: AtomicUsize::new(0),
            yields: AtomicUsize::new(0),
        }
    }

    /// 测试中调用方总在 0 号核上
    pub fn current_cpu(&self) -> usize {
        0
    }

    pub fn send_ipi(&self, _cpu: usize) {
        self.ipis.fetch_add(1, Ordering::Relaxed);
    }

    pub fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ipis(&self) -> usize {
        self.ipis.load(Ordering::Relaxed)
    }

    pub fn yields(&self) -> usize {
        self.yields.load(Ordering::Relaxed)
    }
}

/// 全局 Mock 实例
pub static MOCK_TASK_OPS: MockTaskOps = MockTaskOps::new();
