//! 进程与进程表
//!
//! # 引用计数
//!
//! 进程的生命周期由加锁的引用计数决定，持有者拿到的是 [`ProcessHandle`]：
//! 克隆即加一，析构即减一。计数从 1 变为 0 的那次析构负责把进程从表中摘除，
//! 并在同一把计数锁下拆除进程的全部资源。两条分支都由析构自身释放计数锁。
//!
//! 计数已经归零的进程对 [`ProcessTable::lookup`] 不可见。
//!
//! # 锁顺序
//!
//! 析构持有计数锁时会获取进程表锁，因此持有进程表锁的代码
//! （例如 [`ProcessTable::for_each_in_group`] 的回调）绝不能再获取任何进程的计数锁。

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::ops::Deref;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use mm::AddressSpace;
use sync::SpinLock;
use vfs::{FileTable, Tnode};

use crate::timer::{Clock, TimerId, TimerKind, Timers};
use crate::umutex::{self, UserMutex};
use crate::{TaskError, TaskResult};

/// 进程号
pub type Pid = usize;

/// 进程
pub struct Process {
    pid: Pid,
    pgid: Pid,
    ppid: Pid,
    refs: SpinLock<usize>,
    exiting: AtomicBool,
    table: Weak<ProcessTable>,
    space: SpinLock<AddressSpace>,
    files: FileTable,
    cwd: SpinLock<Option<Arc<Tnode>>>,
    pub(crate) mutexes: SpinLock<Vec<Arc<UserMutex>>>,
    timers: SpinLock<Timers>,
    clock: SpinLock<Option<Clock>>,
}

impl Process {
    /// 创建尚未登记的进程
    pub fn new(
        pid: Pid,
        pgid: Pid,
        ppid: Pid,
        space: AddressSpace,
        files: FileTable,
        cwd: Arc<Tnode>,
    ) -> Self {
        Self {
            pid,
            pgid,
            ppid,
            refs: SpinLock::new(0),
            exiting: AtomicBool::new(false),
            table: Weak::new(),
            space: SpinLock::new(space),
            files,
            cwd: SpinLock::new(Some(cwd)),
            mutexes: SpinLock::new(Vec::new()),
            timers: SpinLock::new(Timers::new()),
            clock: SpinLock::new(Some(Clock::new())),
        }
    }

    /// 进程号
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 进程组号
    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    /// 父进程号
    pub fn ppid(&self) -> Pid {
        self.ppid
    }

    /// 当前引用计数
    pub fn ref_count(&self) -> usize {
        *self.refs.lock()
    }

    /// 是否已被标记退出
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// 标记退出；它的任务会在下一次调度时被回收
    pub fn mark_exiting(&self) {
        self.exiting.store(true, Ordering::Release);
    }

    /// 地址空间
    pub fn space(&self) -> &SpinLock<AddressSpace> {
        &self.space
    }

    /// 文件表
    pub fn files(&self) -> &FileTable {
        &self.files
    }

    /// 当前工作目录；进程拆除后为 `None`
    pub fn cwd(&self) -> Option<Arc<Tnode>> {
        self.cwd.lock().clone()
    }

    /// 切换当前工作目录
    pub fn set_cwd(&self, cwd: Arc<Tnode>) {
        *self.cwd.lock() = Some(cwd);
    }

    /// 进程登记的用户互斥量个数
    pub fn mutex_count(&self) -> usize {
        self.mutexes.lock().len()
    }

    /// 进程是否登记了该用户互斥量
    pub fn owns_mutex(&self, entry: &Arc<UserMutex>) -> bool {
        self.mutexes.lock().iter().any(|m| Arc::ptr_eq(m, entry))
    }

    /// 添加定时器
    pub fn add_timer(&self, deadline: u64, kind: TimerKind) -> TimerId {
        self.timers.lock().add_timer(deadline, kind)
    }

    /// 取消定时器
    pub fn cancel_timer(&self, id: TimerId) -> TaskResult<()> {
        self.timers.lock().cancel_timer(id)
    }

    /// 收集到期的定时器
    pub fn expire_timers(&self, now: u64) -> Vec<TimerId> {
        self.timers.lock().expire(now)
    }

    /// 活跃定时器个数
    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// 推进进程时钟；时钟已销毁时返回 `None`
    pub fn tick(&self, n: u64) -> Option<u64> {
        self.clock.lock().as_mut().map(|c| c.tick(n))
    }

    /// 进程时钟累计的 tick；时钟已销毁时返回 `None`
    pub fn ticks(&self) -> Option<u64> {
        self.clock.lock().as_ref().map(Clock::ticks)
    }

    /// 拆除进程资源，由最后一个句柄的析构调用
    fn teardown(&self) {
        self.mark_exiting();

        let files = self.files.take_all();
        let nfiles = files.len();
        drop(files);

        let nregions = self.space.lock().release_all();
        let nmutexes = umutex::release_owned(self);
        let ntimers = self.timers.lock().cancel_all();
        self.cwd.lock().take();
        self.clock.lock().take();

        log::debug!(
            "task: process {} torn down ({} files, {} regions, {} mutexes, {} timers)",
            self.pid,
            nfiles,
            nregions,
            nmutexes,
            ntimers
        );
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("pgid", &self.pgid)
            .field("ppid", &self.ppid)
            .field("exiting", &self.is_exiting())
            .finish()
    }
}

/// 计数引用的进程句柄
pub struct ProcessHandle {
    process: Arc<Process>,
}

impl ProcessHandle {
    /// 计数不为零时加一并返回句柄
    fn try_bump(process: Arc<Process>) -> Option<Self> {
        let mut refs = process.refs.lock();
        if *refs == 0 {
            return None;
        }
        *refs += 1;
        drop(refs);
        Some(Self { process })
    }

    /// 不参与计数的弱引用
    pub fn downgrade(&self) -> Weak<Process> {
        Arc::downgrade(&self.process)
    }

    /// 两个句柄是否指向同一进程
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.process, &b.process)
    }
}

impl Deref for ProcessHandle {
    type Target = Process;

    fn deref(&self) -> &Process {
        &self.process
    }
}

impl Clone for ProcessHandle {
    fn clone(&self) -> Self {
        *self.process.refs.lock() += 1;
        Self {
            process: self.process.clone(),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let mut refs = self.process.refs.lock();
        debug_assert!(*refs > 0, "process {} refcount underflow", self.process.pid);
        *refs -= 1;
        if *refs > 0 {
            return;
        }

        if let Some(table) = self.process.table.upgrade() {
            table.remove(&self.process);
        }
        self.process.teardown();
        drop(refs);
    }
}

impl core::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.process.fmt(f)
    }
}

/// 进程表
pub struct ProcessTable {
    procs: SpinLock<BTreeMap<Pid, Arc<Process>>>,
    next_pid: AtomicUsize,
}

impl ProcessTable {
    /// 创建空进程表
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            procs: SpinLock::new(BTreeMap::new()),
            next_pid: AtomicUsize::new(1),
        })
    }

    /// 分配一个新进程号（从 1 开始单调递增）
    pub fn alloc_pid(&self) -> Pid {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }

    /// 登记进程，返回引用计数为 1 的句柄
    ///
    /// 进程号已存在时返回 `AlreadyExists`，传入的进程随之析构。
    pub fn register(self: &Arc<Self>, mut process: Process) -> TaskResult<ProcessHandle> {
        process.table = Arc::downgrade(self);
        *process.refs.get_mut() = 1;
        let process = Arc::new(process);

        let mut procs = self.procs.lock();
        if procs.contains_key(&process.pid) {
            return Err(TaskError::AlreadyExists);
        }
        procs.insert(process.pid, process.clone());
        drop(procs);

        log::debug!("task: registered process {}", process.pid);
        Ok(ProcessHandle { process })
    }

    /// 按进程号查找；计数已归零的进程视为不存在
    pub fn lookup(&self, pid: Pid) -> Option<ProcessHandle> {
        let process = self.procs.lock().get(&pid).cloned()?;
        ProcessHandle::try_bump(process)
    }

    /// 登记的进程个数
    pub fn len(&self) -> usize {
        self.procs.lock().len()
    }

    /// 是否没有登记任何进程
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否登记了该进程号
    pub fn contains(&self, pid: Pid) -> bool {
        self.procs.lock().contains_key(&pid)
    }

    /// 持有进程表锁，对进程组 `pgid` 的每个成员调用一次 `f`
    ///
    /// `f` 在锁内执行，不得获取进程的计数锁，也不得让出处理器。
    pub fn for_each_in_group<F>(&self, pgid: Pid, mut f: F)
    where
        F: FnMut(&Process),
    {
        let procs = self.procs.lock();
        for process in procs.values().filter(|p| p.pgid == pgid) {
            f(process);
        }
    }

    fn remove(&self, process: &Arc<Process>) {
        let mut procs = self.procs.lock();
        if procs
            .get(&process.pid)
            .is_some_and(|p| Arc::ptr_eq(p, process))
        {
            procs.remove(&process.pid);
        }
    }
}
