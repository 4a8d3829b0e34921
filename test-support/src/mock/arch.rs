//! 架构相关操作的 Mock 实现

use core::sync::atomic::{AtomicUsize, Ordering};

/// Mock 架构操作
///
/// 中断开关为空操作；CPU 数量可调，用于多核调度测试。
pub struct MockArchOps {
    pub cpu_id: AtomicUsize,
    pub max_cpus: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            cpu_id: AtomicUsize::new(0),
            max_cpus: AtomicUsize::new(4),
        }
    }

    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        0
    }

    pub unsafe fn restore_interrupts(&self, _flags: usize) {}

    pub fn cpu_id(&self) -> usize {
        self.cpu_id.load(Ordering::Relaxed)
    }

    pub fn max_cpu_count(&self) -> usize {
        self.max_cpus.load(Ordering::Relaxed)
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
