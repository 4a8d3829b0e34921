//! 内核上下文对象
//!
//! 所有子系统的全局状态集中在 [`Kernel`] 中，启动时构造一次，
//! 之后以共享引用传给系统调用与异常处理路径。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use mm::{AddressSpace, MemoryObject, PageNum, RegionType, Vaddr, VmFlags, VmRegion, Vpn, VpnRange};
use task::{
    Context, Pid, Process, ProcessHandle, ProcessTable, Scheduler, SignalOutcome, Task, TaskError,
    TimerId, UserMutexTable, signal_group, task_ops,
};
use vfs::{DevFs, FileTable, MountTable, OpenFlags, RamFs};

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::mm_bridge::FileBacking;

/// 帧分配器是全局的，只初始化一次
static FRAMES_READY: AtomicBool = AtomicBool::new(false);

/// 内核上下文
pub struct Kernel {
    config: KernelConfig,
    processes: Arc<ProcessTable>,
    sched: Scheduler,
    umutexes: Arc<UserMutexTable>,
    mounts: MountTable,
    devfs: Arc<DevFs>,
}

impl Kernel {
    /// 启动：初始化帧分配器，建立进程表、调度器、用户互斥量表，
    /// 挂载 ramfs 根并把 devfs 挂到 `/dev`
    ///
    /// 平台钩子必须已经注册。帧分配器已初始化时沿用现有状态。
    pub fn boot(config: KernelConfig) -> KernelResult<Self> {
        if config.cpu_count == 0 {
            return Err(KernelError::Task(TaskError::InvalidCpu));
        }

        if FRAMES_READY.swap(true, Ordering::AcqRel) {
            log::warn!("kernel: frame allocator already initialized");
        } else {
            mm::init_frame_allocator(config.phys_start, config.phys_end);
        }

        let mounts = MountTable::new();
        let root = mounts.mount(RamFs::new(), None, "/")?;
        root.root().mkdir("dev", 0o755)?;
        let devfs = DevFs::new();
        mounts.mount(devfs.clone(), None, "/dev")?;

        log::info!(
            "kernel: booted with {} cpus, {} ipi slots, {} fds per process",
            config.cpu_count,
            config.ipi_inbox_capacity,
            config.file_table_size
        );

        Ok(Self {
            config,
            processes: ProcessTable::new(),
            sched: Scheduler::new(config.cpu_count, config.ipi_inbox_capacity),
            umutexes: UserMutexTable::new(),
            mounts,
            devfs,
        })
    }

    /// 启动配置
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// 进程表
    pub fn processes(&self) -> &Arc<ProcessTable> {
        &self.processes
    }

    /// 调度器
    pub fn sched(&self) -> &Scheduler {
        &self.sched
    }

    /// 用户互斥量表
    pub fn umutexes(&self) -> &Arc<UserMutexTable> {
        &self.umutexes
    }

    /// 挂载表
    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// 设备注册表
    pub fn devfs(&self) -> &Arc<DevFs> {
        &self.devfs
    }

    /// 创建进程及其第一个任务，并交给当前核调度
    ///
    /// 新进程拥有全新的地址空间和用户栈。有父进程时继承其进程组、
    /// 文件表副本与工作目录；否则自成一组，工作目录为根。
    pub fn spawn(&self, parent: Option<&ProcessHandle>, entry: usize) -> KernelResult<Arc<Task>> {
        let pid = self.processes.alloc_pid();
        let (pgid, ppid) = parent.map_or((pid, 0), |p| (p.pgid(), p.pid()));

        let mut space = AddressSpace::new()?;
        let stack = space.alloc_user_stack()?;
        let sp = stack.end().start_addr().as_usize();

        let (files, cwd) = match parent {
            Some(p) => (
                p.files().clone_table(),
                p.cwd().map_or_else(|| self.mounts.root(), Ok)?,
            ),
            None => (FileTable::new(self.config.file_table_size), self.mounts.root()?),
        };

        let handle = self
            .processes
            .register(Process::new(pid, pgid, ppid, space, files, cwd))?;
        let cpu = task_ops().current_cpu();
        let task = Task::new(handle, Context::new(entry, sp), cpu);
        self.sched.schedule_on(cpu, task.clone())?;

        log::debug!(
            "kernel: spawned pid {} (pgid {}, ppid {}) tid {} on cpu {}",
            pid,
            pgid,
            ppid,
            task.tid(),
            cpu
        );
        Ok(task)
    }

    /// 把 `path` 处文件的前 `pages` 页只读映射到 `start`
    ///
    /// 页在首次访问时从文件读入；路径相对于进程的工作目录解析。
    pub fn map_file(
        &self,
        process: &ProcessHandle,
        path: &str,
        start: Vaddr,
        pages: usize,
    ) -> KernelResult<()> {
        if !start.is_page_aligned() || pages == 0 {
            return Err(KernelError::Mm(mm::MmError::InvalidAddress));
        }
        let cwd = process.cwd().map_or_else(|| self.mounts.root(), Ok)?;
        let file = self
            .mounts
            .lookup_from(&cwd, path)?
            .open(OpenFlags::O_RDONLY)?;

        let object = MemoryObject::file(FileBacking::new(file), 0, pages);
        let region = VmRegion::new(
            VpnRange::from_start_len(Vpn::from_addr_floor(start), pages),
            VmFlags::USER | VmFlags::NO_EXEC,
            RegionType::UserMmap,
        )
        .with_object(object, 0);
        process.space().lock().map_region(region)?;
        Ok(())
    }

    /// 解除进程中 `kind` 区域的映射，并请求其它核冲刷这段地址的 TLB
    ///
    /// 本核的条目在解除映射时已逐页冲刷。
    pub fn unmap_region(
        &self,
        process: &ProcessHandle,
        kind: RegionType,
    ) -> KernelResult<VmRegion> {
        let region = process.space().lock().unmap_region(kind)?;
        self.flush_remote(region.start(), region.pages());
        log::debug!(
            "kernel: pid {} unmapped {:?} ({} pages)",
            process.pid(),
            kind,
            region.pages()
        );
        Ok(region)
    }

    /// 把进程中 `kind` 区域的末端前移 `pages` 页，并请求其它核冲刷被截掉的部分
    pub fn contract_region(
        &self,
        process: &ProcessHandle,
        kind: RegionType,
        pages: usize,
    ) -> KernelResult<()> {
        let end = {
            let mut space = process.space().lock();
            space.contract_end(kind, pages)?;
            space
                .regions()
                .get(kind)
                .map(|region| region.end())
                .ok_or(KernelError::Mm(mm::MmError::NotFound))?
        };
        self.flush_remote(end, pages);
        Ok(())
    }

    fn flush_remote(&self, start: Vaddr, pages: usize) {
        let local = task_ops().current_cpu();
        for cpu in (0..self.sched.cpu_count()).filter(|&cpu| cpu != local) {
            // 映射已经拆除，投递失败只能记录
            if let Err(e) = self.sched.flush_tlb_range(cpu, start, pages) {
                log::warn!("kernel: tlb flush to cpu {} not posted: {:?}", cpu, e);
            }
        }
    }

    /// 在 `cpu` 上处理挂起的 IPI 并选出下一个任务
    pub fn schedule(&self, cpu: usize) -> KernelResult<Option<Arc<Task>>> {
        self.sched.drain_ipi(cpu)?;
        let next = self.sched.sched_run_next(cpu);
        crate::log::set_current_tid(cpu, next.as_ref().map_or(0, |t| t.tid()));
        Ok(next)
    }

    /// 向进程组发送终止信号
    pub fn signal_group(&self, pgid: Pid, sender: Pid) -> SignalOutcome {
        signal_group(&self.processes, &self.sched, pgid, sender)
    }

    /// `cpu` 上的时钟中断
    ///
    /// 推进日志时间戳和该核当前任务所属进程的时钟，返回因此到期的定时器。
    /// 核上没有当前任务或进程时钟已销毁时不触发任何定时器。
    pub fn tick(&self, cpu: usize, n: usize) -> Vec<TimerId> {
        crate::log::advance_ticks(n);
        let Some(task) = self.sched.current(cpu) else {
            return Vec::new();
        };
        let process = task.process();
        let Some(now) = process.tick(n as u64) else {
            return Vec::new();
        };
        let fired = process.expire_timers(now);
        if !fired.is_empty() {
            log::debug!(
                "kernel: pid {} timers {:?} expired at tick {}",
                process.pid(),
                fired,
                now
            );
        }
        fired
    }
}

impl core::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("processes", &self.processes.len())
            .field("umutexes", &self.umutexes.len())
            .finish()
    }
}
