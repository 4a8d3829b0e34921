//! 进程组信号
//!
//! 向进程组发送终止信号：组内每个成员被标记退出，并在所有核上解除其 FPU 关联。
//! 成员的任务在各核下一次调度时被回收。

use crate::process::{Pid, ProcessTable};
use crate::sched::Scheduler;
use crate::task_ops;

/// 一次组信号的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOutcome {
    /// 被标记退出的进程数
    pub signalled: usize,
    /// 发送者本身是否在组内
    pub sender_in_group: bool,
}

/// 向进程组 `pgid` 发送终止信号
///
/// 遍历在进程表锁内完成，每个进程恰好访问一次。发送者在组内时同样被标记，
/// 遍历照常走完剩余成员；让出处理器推迟到进程表锁释放之后。
pub fn signal_group(
    table: &ProcessTable,
    sched: &Scheduler,
    pgid: Pid,
    sender: Pid,
) -> SignalOutcome {
    let mut outcome = SignalOutcome {
        signalled: 0,
        sender_in_group: false,
    };

    table.for_each_in_group(pgid, |process| {
        process.mark_exiting();
        sched.clear_fpu_owner(process.pid());
        outcome.signalled += 1;
        if process.pid() == sender {
            outcome.sender_in_group = true;
        }
    });

    log::debug!(
        "signal: group {} from {}: {} signalled",
        pgid,
        sender,
        outcome.signalled
    );

    if outcome.sender_in_group {
        task_ops().yield_now();
    }
    outcome
}
