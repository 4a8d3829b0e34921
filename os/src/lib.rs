//! Kestrel 内核上下文
//!
//! 启动时由 [`Kernel::boot`] 构造内核上下文对象：物理帧分配器、进程表、
//! 每核调度器、用户互斥量表以及 VFS（ramfs 根，devfs 挂在 `/dev`）。
//! 平台相关的钩子（中断、TLB、IPI、日志输出）由嵌入方在启动前注册。

#![no_std]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fault;
pub mod kernel;
pub mod log;
pub mod mm_bridge;
pub mod umutex;

pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use fault::{Fault, FaultAccess, FaultOutcome, handle_fault};
pub use kernel::Kernel;
pub use umutex::{
    WaitResult, WakeResult, sys_umutex_wait, sys_umutex_wake, umutex_wait, umutex_wake,
};
