//! 原始自旋锁
//!
//! 提供两种形态：
//!
//! - [`RawSpinLock`]：返回借用式 RAII 守卫，中断状态保存在守卫中
//! - [`RawSpinIrq`]：实现 [`lock_api::RawMutex`]，中断状态保存在锁内部，
//!   供 [`SpinMutex`] 使用，使守卫可以脱离栈帧（例如被 `Arc` 持有）

use crate::intr_guard::IntrGuard;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// 自旋锁结构体，提供互斥访问临界区的能力。
///
/// 不可重入 (即不能嵌套调用 RawSpinLock::lock())。
///
/// # 示例
/// ```ignore
/// let lock = RawSpinLock::new();
/// {
///   let guard = lock.lock(); // 获取锁，禁用中断
///   // 临界区代码
/// } // 离开作用域，自动释放锁并恢复中断状态
/// ```
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
        }
    }

    /// 获取自旋锁，并返回一个 RAII 保护器。
    pub fn lock(&self) -> RawSpinLockGuard<'_> {
        let intr_guard = IntrGuard::new();
        acquire(&self.lock);
        RawSpinLockGuard {
            lock: self,
            _intr_guard: intr_guard,
        }
    }

    /// 尝试获取自旋锁，失败时立即恢复中断状态并返回 None。
    pub fn try_lock(&self) -> Option<RawSpinLockGuard<'_>> {
        let intr_guard = IntrGuard::new();
        try_acquire(&self.lock).then(|| RawSpinLockGuard {
            lock: self,
            _intr_guard: intr_guard,
        })
    }

    /// 锁当前是否被持有
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// 自动释放自旋锁和恢复中断状态的 RAII 结构体
///
/// 字段顺序保证先释放锁标志，再恢复中断。
pub struct RawSpinLockGuard<'a> {
    lock: &'a RawSpinLock,
    _intr_guard: IntrGuard,
}

impl Drop for RawSpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.lock.store(false, Ordering::Release);
    }
}

#[inline]
fn acquire(flag: &AtomicBool) {
    while flag
        .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        while flag.load(Ordering::Relaxed) {
            hint::spin_loop();
        }
    }
}

#[inline]
fn try_acquire(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_ok()
}

/// 关中断自旋锁，`lock_api` 的原始锁实现
///
/// 加锁时关闭本地中断并把之前的状态记录在锁内部，解锁时先释放锁再恢复。
/// 由于状态不在栈上，守卫可以被移动、被 `Arc` 持有，甚至跨函数返回。
pub struct RawSpinIrq {
    locked: AtomicBool,
    saved_flags: AtomicUsize,
}

// SAFETY: 互斥由 `locked` 上的 Acquire/Release 保证
unsafe impl lock_api::RawMutex for RawSpinIrq {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinIrq {
        locked: AtomicBool::new(false),
        saved_flags: AtomicUsize::new(0),
    };

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        let intr_guard = IntrGuard::new();
        acquire(&self.locked);
        self.saved_flags
            .store(intr_guard.into_flags(), Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        let intr_guard = IntrGuard::new();
        if try_acquire(&self.locked) {
            self.saved_flags
                .store(intr_guard.into_flags(), Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_flags.load(Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        // SAFETY: flags 是 lock() 时关闭中断前的状态
        unsafe { crate::arch_ops().restore_interrupts(flags) };
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// 基于 [`RawSpinIrq`] 的互斥锁
pub type SpinMutex<T> = lock_api::Mutex<RawSpinIrq, T>;

/// [`SpinMutex`] 的借用式守卫
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinIrq, T>;

/// 通过 `Arc<SpinMutex<T>>` 持有的守卫，不借用锁本身
pub type ArcSpinMutexGuard<T> = lock_api::ArcMutexGuard<RawSpinIrq, T>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;

    #[test]
    fn test_raw_spin_lock_exclusive() {
        let lock = RawSpinLock::new();
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_spin_mutex_basic() {
        let m = SpinMutex::new(5);
        {
            let mut g = m.lock();
            *g += 1;
            assert!(m.try_lock().is_none());
        }
        assert_eq!(*m.lock(), 6);
    }

    #[test]
    fn test_arc_guard_outlives_scope() {
        fn lock_and_return(m: &Arc<SpinMutex<u32>>) -> ArcSpinMutexGuard<u32> {
            m.lock_arc()
        }

        let m = Arc::new(SpinMutex::new(0u32));
        let mut g = lock_and_return(&m);
        *g = 42;
        assert!(m.is_locked());
        drop(g);
        assert!(!m.is_locked());
        assert_eq!(*m.lock(), 42);
    }
}
