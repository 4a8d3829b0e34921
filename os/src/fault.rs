//! 致命异常处理
//!
//! 落在有后备对象的区域内、且访问权限与区域相符的缺页被就地装页并恢复执行；
//! 其它异常打印诊断信息，所属进程被标记退出，然后请求重新调度。

use alloc::sync::Arc;

use bitflags::bitflags;
use mm::{MmError, MmResult, Ppn, Vaddr, VmFlags};
use task::{Task, task_ops};

use crate::kernel::Kernel;

bitflags! {
    /// 缺页时的访问类型
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultAccess: u8 {
        /// 读
        const READ = 1 << 0;
        /// 写
        const WRITE = 1 << 1;
        /// 取指
        const EXECUTE = 1 << 2;
        /// 来自用户态
        const USER = 1 << 3;
    }
}

/// 陷入内核的异常
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 缺页
    PageFault {
        /// 出错地址
        addr: Vaddr,
        /// 访问类型
        access: FaultAccess,
    },
    /// 一般保护错误
    GeneralProtection,
    /// 双重错误
    DoubleFault,
    /// 非法指令
    InvalidOpcode,
}

/// 异常处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// 已修复，任务继续执行
    Resumed,
    /// 进程已被标记退出
    Killed,
}

/// 处理 `task` 上发生的异常
pub fn handle_fault(kernel: &Kernel, task: &Arc<Task>, fault: Fault) -> FaultOutcome {
    let cause = match fault {
        Fault::PageFault { addr, access } => match resolve_page_fault(task, addr, access) {
            Ok(ppn) => {
                log::trace!("fault: {:#x} -> {:?} for tid {}", addr, ppn, task.tid());
                return FaultOutcome::Resumed;
            }
            Err(e) => Some(e),
        },
        _ => None,
    };

    dump(task, &fault, cause);

    let process = task.process();
    process.mark_exiting();
    kernel.sched().clear_fpu_owner(process.pid());
    task_ops().yield_now();
    FaultOutcome::Killed
}

fn resolve_page_fault(task: &Task, addr: Vaddr, access: FaultAccess) -> MmResult<Ppn> {
    let mut space = task.process().space().lock();
    let flags = space
        .regions()
        .find(addr)
        .ok_or(MmError::InvalidAddress)?
        .flags();
    if (access.contains(FaultAccess::WRITE) && !flags.contains(VmFlags::WRITABLE))
        || (access.contains(FaultAccess::EXECUTE) && flags.contains(VmFlags::NO_EXEC))
        || (access.contains(FaultAccess::USER) && !flags.contains(VmFlags::USER))
    {
        return Err(MmError::InvalidAddress);
    }
    space.populate(addr)
}

fn dump(task: &Task, fault: &Fault, cause: Option<MmError>) {
    let process = task.process();
    let ctx = task.context();
    log::error!(
        "fault: {:?} in tid {} (pid {}) on cpu {}",
        fault,
        task.tid(),
        process.pid(),
        task.cpu()
    );
    log::error!("fault: pc={:#x} sp={:#x} args={:x?}", ctx.pc, ctx.sp, ctx.args);

    if let Fault::PageFault { addr, .. } = fault {
        let space = process.space().lock();
        match space.regions().find(*addr) {
            Some(region) if region.flags().contains(VmFlags::GUARD) => {
                log::error!("fault: guard page hit at {:#x}", addr);
            }
            Some(region) => log::error!(
                "fault: {:#x} in {:?} [{:#x}, {:#x}) {:?}: {:?}",
                addr,
                region.kind(),
                region.start(),
                region.end(),
                region.flags(),
                cause
            ),
            None => log::error!("fault: {:#x} outside any region", addr),
        }
    }
}
