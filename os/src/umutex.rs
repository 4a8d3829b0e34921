//! 用户态互斥量系统调用
//!
//! 互斥量字的读取与挂起都在表项的等待队列锁内完成，
//! 和释放路径的“有等待者则不写”互斥，唤醒不会丢失。

use alloc::sync::Arc;

use mm::Vaddr;
use task::{Release, Task, task_ops};
use uapi::umutex::{UMUTEX_PARKED, UMUTEX_WOKE_IMMEDIATELY, UMUTEX_WRITTEN};

use crate::error::KernelResult;
use crate::kernel::Kernel;

/// wait 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// 互斥量字已不等于期望值
    WokeImmediately,
    /// 任务已挂起
    Parked,
}

/// wake 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// 没有等待者，值已写回
    Written,
    /// 唤醒了若干等待者，值未写回
    Woken(usize),
}

/// 互斥量字等于 `expected` 时把 `task` 挂到 `addr` 的等待队列上
pub fn umutex_wait(
    kernel: &Kernel,
    task: &Arc<Task>,
    addr: usize,
    expected: u32,
) -> KernelResult<WaitResult> {
    let process = task.process();
    let vaddr = Vaddr::from_usize(addr);
    let mut space = process.space().lock();
    let locked = kernel.umutexes().lock_or_create(&mut space, process, vaddr)?;

    // 出错返回时 `locked` 析构，空闲表项随之删除
    let current = space.read_u32(vaddr)?;
    if current != expected {
        locked.unlock();
        return Ok(WaitResult::WokeImmediately);
    }

    locked.wait(task.clone());
    drop(space);
    log::trace!("umutex: tid {} parked on {:#x}", task.tid(), addr);
    task_ops().yield_now();
    Ok(WaitResult::Parked)
}

/// 释放 `addr` 处的互斥量：没有等待者时写入 `value`，否则唤醒至多 `count` 个
pub fn umutex_wake(
    kernel: &Kernel,
    task: &Arc<Task>,
    addr: usize,
    value: u32,
    count: usize,
) -> KernelResult<WakeResult> {
    let vaddr = Vaddr::from_usize(addr);
    let mut space = task.process().space().lock();
    match kernel.umutexes().release_or_write(&mut space, vaddr, value)? {
        Release::FullyReleased => Ok(WakeResult::Written),
        Release::Contended(mut locked) => {
            drop(space);
            let woken = locked.wake(count, None);
            locked.unlock();
            log::trace!("umutex: woke {} on {:#x}", woken, addr);
            Ok(WakeResult::Woken(woken))
        }
    }
}

/// `umutex_wait` 系统调用入口
pub fn sys_umutex_wait(kernel: &Kernel, task: &Arc<Task>, addr: usize, expected: u32) -> isize {
    match umutex_wait(kernel, task, addr, expected) {
        Ok(WaitResult::WokeImmediately) => UMUTEX_WOKE_IMMEDIATELY,
        Ok(WaitResult::Parked) => UMUTEX_PARKED,
        Err(e) => e.to_errno(),
    }
}

/// `umutex_wake` 系统调用入口
///
/// 返回唤醒数；没有等待者时返回 0，与唤醒 0 个不作区分。
pub fn sys_umutex_wake(
    kernel: &Kernel,
    task: &Arc<Task>,
    addr: usize,
    value: u32,
    count: usize,
) -> isize {
    match umutex_wake(kernel, task, addr, value, count) {
        Ok(WakeResult::Written) => UMUTEX_WRITTEN,
        Ok(WakeResult::Woken(n)) => isize::try_from(n).unwrap_or(isize::MAX),
        Err(e) => e.to_errno(),
    }
}
