//! 任务子系统所需的平台操作 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 平台提供给调度器的操作
///
/// os crate 为具体平台实现此 trait 并在启动时注册。
pub trait TaskOps: Send + Sync {
    /// 向 `cpu` 发送处理器间中断
    fn send_ipi(&self, cpu: usize);

    /// 当前执行所在的核号
    fn current_cpu(&self) -> usize;

    /// 让出当前核，请求重新调度
    fn yield_now(&self);
}

static TASK_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static TASK_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册任务操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_task_ops(ops: &'static dyn TaskOps) {
    let ptr = ops as *const dyn TaskOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn TaskOps, (usize, usize)>(ptr) };
    TASK_OPS_VTABLE.store(vtable, Ordering::Release);
    TASK_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的任务操作实现
///
/// # Panics
/// 如果尚未调用 [`register_task_ops`] 注册实现，则 panic
#[inline]
pub fn task_ops() -> &'static dyn TaskOps {
    let data = TASK_OPS_DATA.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            return &test_support::mock::task::MOCK_TASK_OPS;
        }
        #[cfg(not(test))]
        panic!("task: TaskOps not registered");
    }
    let vtable = TASK_OPS_VTABLE.load(Ordering::Acquire);
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn TaskOps>((data, vtable)) }
}

#[cfg(test)]
impl TaskOps for test_support::mock::task::MockTaskOps {
    fn send_ipi(&self, cpu: usize) {
        test_support::mock::task::MockTaskOps::send_ipi(self, cpu)
    }

    fn current_cpu(&self) -> usize {
        test_support::mock::task::MockTaskOps::current_cpu(self)
    }

    fn yield_now(&self) {
        test_support::mock::task::MockTaskOps::yield_now(self)
    }
}
