//! 同步原语
//!
//! 向其它内核模块提供短临界区使用的锁：
//!
//! - [`SpinLock`]：带中断保护的不可重入自旋锁，守卫借用锁本身
//! - [`SpinMutex`]：基于 `lock_api` 的同一语义，额外支持 `Arc` 持有的守卫
//!   （[`ArcSpinMutexGuard`]），用于“加锁后返回给调用者”的场景
//! - [`SpinRwLock`]：读多写少的数据（挂载表、设备表）
//! - [`IntrGuard`]：本地中断保护
//!
//! 所有锁只应包住指针/链表操作，持锁期间不得阻塞。
//!
//! # 架构依赖
//!
//! 此 crate 通过 `ArchOps` trait 抽象架构相关操作。
//! 启动早期（或主机上运行单元测试时）尚未注册实现，此时使用
//! [`EarlyArchOps`]：单 CPU、中断开关为空操作。

#![no_std]

extern crate alloc;

mod intr_guard;
mod raw_spin_lock;
mod rwlock;
mod spin_lock;

pub use intr_guard::*;
pub use raw_spin_lock::*;
pub use rwlock::*;
pub use spin_lock::*;

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由 os crate 实现并注册，提供中断控制和 CPU 信息
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 判断保存的状态中中断是否处于启用状态
    fn interrupts_enabled_in(&self, flags: usize) -> bool;

    /// 获取当前 CPU ID
    fn cpu_id(&self) -> usize;

    /// 获取最大 CPU 数量
    fn max_cpu_count(&self) -> usize;
}

/// 尚未注册架构实现时使用的缺省操作
///
/// 启动早期中断本就处于关闭状态，因此开关中断为空操作。
pub struct EarlyArchOps;

impl ArchOps for EarlyArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        0
    }

    unsafe fn restore_interrupts(&self, _flags: usize) {}

    fn interrupts_enabled_in(&self, flags: usize) -> bool {
        flags != 0
    }

    fn cpu_id(&self) -> usize {
        0
    }

    fn max_cpu_count(&self) -> usize {
        1
    }
}

static EARLY_ARCH_OPS: EarlyArchOps = EarlyArchOps;

/// 全局架构操作实例（存储 fat pointer 的两个部分）
static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取架构操作实例
#[inline]
pub fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    if data == 0 {
        return &EARLY_ARCH_OPS;
    }
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

/// 当前 CPU ID 的便捷封装
#[inline]
pub fn cpu_id() -> usize {
    arch_ops().cpu_id()
}
