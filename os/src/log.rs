//! 内核日志初始化
//!
//! 把 klog 安装为 `log` 门面的后端，并注册上下文提供者与控制台输出。
//! 上下文中的任务号与时间戳由 [`crate::Kernel`] 在调度和时钟推进时更新。

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use klog::{LogContextProvider, LogOutput};

/// 记录当前任务号的最大核数
pub const MAX_LOG_CPUS: usize = 16;

static CURRENT_TID: [AtomicU32; MAX_LOG_CPUS] = [const { AtomicU32::new(0) }; MAX_LOG_CPUS];
static TICKS: AtomicUsize = AtomicUsize::new(0);

/// 记录 `cpu` 上正在运行的任务号（0 表示空闲）
pub fn set_current_tid(cpu: usize, tid: usize) {
    if let Some(slot) = CURRENT_TID.get(cpu) {
        slot.store(u32::try_from(tid).unwrap_or(u32::MAX), Ordering::Relaxed);
    }
}

/// 推进日志时间戳
pub fn advance_ticks(n: usize) {
    TICKS.fetch_add(n, Ordering::Relaxed);
}

/// 当前日志时间戳
pub fn ticks() -> usize {
    TICKS.load(Ordering::Relaxed)
}

struct KernelLogContext;

impl LogContextProvider for KernelLogContext {
    fn cpu_id(&self) -> usize {
        sync::cpu_id()
    }

    fn task_id(&self) -> u32 {
        CURRENT_TID
            .get(sync::cpu_id())
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    fn timestamp(&self) -> usize {
        ticks()
    }
}

static KERNEL_LOG_CONTEXT: KernelLogContext = KernelLogContext;

/// 初始化日志系统
///
/// `output` 为平台的控制台；为 `None` 时日志只进入环形缓冲区。
/// 重复初始化返回 `log::SetLoggerError`，已注册的钩子保持不变。
///
/// # Safety
/// 必须在单线程环境下调用
pub unsafe fn init(
    output: Option<&'static dyn LogOutput>,
    level: ::log::LevelFilter,
) -> Result<(), ::log::SetLoggerError> {
    klog::init(level)?;
    // SAFETY: 调用者保证单线程；klog::init 成功说明这是第一次初始化
    unsafe {
        klog::register_context_provider(&KERNEL_LOG_CONTEXT);
        if let Some(output) = output {
            klog::register_log_output(output);
        }
    }
    Ok(())
}
