//! 读写自旋锁
//!
//! 写者持有最高位，读者计数占其余位。不关闭中断，
//! 只能用于不会在中断上下文中访问的数据。

use core::{
    hint,
    sync::atomic::{AtomicUsize, Ordering},
};

const WRITER: usize = 1 << (usize::BITS - 1);

/// 读写自旋锁的原始实现
pub struct RawSpinRwLock {
    state: AtomicUsize,
}

// SAFETY: 写者独占 WRITER 位，读者仅在 WRITER 位为 0 时增加计数
unsafe impl lock_api::RawRwLock for RawSpinRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinRwLock {
        state: AtomicUsize::new(0),
    };

    type GuardMarker = lock_api::GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        state & WRITER == 0
            && self
                .state
                .compare_exchange_weak(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        while !self.try_lock_exclusive() {
            hint::spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.store(0, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }
}

/// 读写自旋锁
pub type SpinRwLock<T> = lock_api::RwLock<RawSpinRwLock, T>;
