//! 任务（调度实体）

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use sync::SpinLock;

use crate::process::ProcessHandle;

/// 任务号
pub type Tid = usize;

static NEXT_TID: AtomicUsize = AtomicUsize::new(1);

/// 分配一个新任务号
pub fn alloc_tid() -> Tid {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}

/// 任务状态
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 可运行
    Ready = 0,
    /// 挂在某个等待队列上
    Sleeping = 1,
    /// 等待调度器回收
    Exiting = 2,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Ready,
            1 => TaskState::Sleeping,
            _ => TaskState::Exiting,
        }
    }
}

/// 保存的用户态寄存器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// 程序计数器
    pub pc: usize,
    /// 栈指针
    pub sp: usize,
    /// 参数寄存器
    pub args: [usize; 6],
}

impl Context {
    /// 以入口和栈顶构造上下文
    pub fn new(pc: usize, sp: usize) -> Self {
        Self {
            pc,
            sp,
            args: [0; 6],
        }
    }
}

/// 任务
///
/// 每个任务持有其所属进程的一个计数句柄，任务被回收时句柄随之释放。
pub struct Task {
    tid: Tid,
    process: ProcessHandle,
    state: AtomicU8,
    context: SpinLock<Context>,
    cpu: AtomicUsize,
}

impl Task {
    /// 创建处于就绪态的任务
    pub fn new(process: ProcessHandle, context: Context, cpu: usize) -> Arc<Self> {
        Arc::new(Self {
            tid: alloc_tid(),
            process,
            state: AtomicU8::new(TaskState::Ready as u8),
            context: SpinLock::new(context),
            cpu: AtomicUsize::new(cpu),
        })
    }

    /// 任务号
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// 所属进程
    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// 当前状态
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 设置状态
    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// 从 `from` 原子地切换到 `to`，成功返回 `true`
    pub fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 任务自身或其进程已被标记退出
    pub fn is_exiting(&self) -> bool {
        self.state() == TaskState::Exiting || self.process.is_exiting()
    }

    /// 保存的寄存器
    pub fn context(&self) -> Context {
        *self.context.lock()
    }

    /// 更新保存的寄存器
    pub fn set_context(&self, context: Context) {
        *self.context.lock() = context;
    }

    /// 亲和的核
    pub fn cpu(&self) -> usize {
        self.cpu.load(Ordering::Relaxed)
    }

    /// 设置亲和的核
    pub fn set_cpu(&self, cpu: usize) {
        self.cpu.store(cpu, Ordering::Relaxed);
    }
}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("tid", &self.tid)
            .field("pid", &self.process.pid())
            .field("state", &self.state())
            .finish()
    }
}
