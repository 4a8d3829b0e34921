//! 进程与调度子系统
//!
//! - [`process`]: 进程、引用计数句柄与进程表
//! - [`task`]: 任务及其状态
//! - [`timer`]: 进程定时器与时钟
//! - [`sched`]: 每核就绪环与 IPI 收件箱
//! - [`signal`]: 进程组信号
//! - [`umutex`]: 以物理地址为键的用户态互斥量
//!
//! # 架构解耦
//!
//! 发送 IPI、查询当前核号和让出处理器通过 [`TaskOps`] 完成，
//! 使用前必须调用 [`register_task_ops`] 注册实现。

#![no_std]

extern crate alloc;

mod error;
mod ops;

pub mod process;
pub mod sched;
pub mod signal;
pub mod task;
pub mod timer;
pub mod umutex;

pub use error::{TaskError, TaskResult};
pub use ops::{TaskOps, register_task_ops, task_ops};

pub use process::{Pid, Process, ProcessHandle, ProcessTable};
pub use sched::{DEFAULT_IPI_CAPACITY, IpiMessage, Scheduler};
pub use signal::{SignalOutcome, signal_group};
pub use task::{Context, Task, TaskState, Tid};
pub use timer::{Clock, TimerId, TimerKind, Timers};
pub use umutex::{LockedUserMutex, Release, UserMutex, UserMutexTable};

#[cfg(test)]
pub(crate) mod test_init {
    extern crate std;

    use alloc::sync::Arc;
    use std::sync::Once;

    use test_support::mock::mm::{MOCK_MM_CONFIG, MOCK_MM_OPS};
    use vfs::{MountTable, RamFs, Tnode};

    struct MmOps;

    impl mm::ArchMmOps for MmOps {
        fn paddr_to_vaddr(&self, paddr: usize) -> usize {
            MOCK_MM_OPS.paddr_to_vaddr(paddr)
        }

        fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
            MOCK_MM_OPS.vaddr_to_paddr(vaddr)
        }

        fn flush_tlb_local(&self, vaddr: usize) {
            MOCK_MM_OPS.flush_tlb_local(vaddr)
        }
    }

    struct MmConfig;

    impl mm::MmConfig for MmConfig {
        fn user_stack_size(&self) -> usize {
            MOCK_MM_CONFIG.user_stack_size()
        }

        fn user_space_end(&self) -> usize {
            MOCK_MM_CONFIG.user_space_end()
        }
    }

    static INIT: Once = Once::new();

    /// 注册内存管理钩子并用模拟物理内存初始化帧分配器（只执行一次）
    pub fn init() {
        INIT.call_once(|| {
            // SAFETY: 在 Once 内只执行一次
            unsafe {
                mm::register_arch_ops(&MmOps);
                mm::register_config(&MmConfig);
            }
            let (start, end) = MOCK_MM_OPS.phys_range();
            mm::init_frame_allocator(start, end);
        });
    }

    /// 一棵新 ramfs 的根，用作测试进程的工作目录
    pub fn root_tnode() -> Arc<Tnode> {
        let mounts = MountTable::new();
        mounts
            .mount(RamFs::new(), None, "/")
            .expect("mount ramfs")
            .root()
            .clone()
    }
}
