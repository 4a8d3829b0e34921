//! 每核调度器
//!
//! 每个核维护一个就绪环：任务节点放在 [`Slab`] 中，下标稳定，
//! 节点之间以下标组成循环双向链表，插入和摘除都是 O(1)。
//! `current` 指向正在运行的节点，新任务插在它之前（即环尾）。
//!
//! 跨核请求通过每核的 IPI 收件箱传递，收件箱容量固定、单独加锁，
//! 接收方在安全点调用 [`Scheduler::drain_ipi`] 时按到达顺序执行。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use mm::{PAGE_SIZE, Vaddr};
use slab::Slab;
use sync::SpinLock;

use crate::process::Pid;
use crate::task::{Task, TaskState};
use crate::{TaskError, TaskResult, task_ops};

/// 默认的每核 IPI 收件箱容量
pub const DEFAULT_IPI_CAPACITY: usize = 32;

/// 跨核消息
#[derive(Debug)]
pub enum IpiMessage {
    /// 失效从 `start` 开始的 `pages` 页的本地 TLB 条目
    TlbFlush {
        /// 起始虚拟地址
        start: Vaddr,
        /// 页数
        pages: usize,
    },
    /// 在接收核上接纳任务
    Schedule(Arc<Task>),
}

struct Node {
    task: Arc<Task>,
    prev: usize,
    next: usize,
}

struct ReadyRing {
    nodes: Slab<Node>,
    current: Option<usize>,
}

impl ReadyRing {
    const fn new() -> Self {
        Self {
            nodes: Slab::new(),
            current: None,
        }
    }

    /// 插入到 current 之前
    fn insert(&mut self, task: Arc<Task>) -> usize {
        let key = self.nodes.vacant_key();
        match self.current {
            None => {
                self.nodes.insert(Node {
                    task,
                    prev: key,
                    next: key,
                });
                self.current = Some(key);
            }
            Some(cur) => {
                let prev = self.nodes[cur].prev;
                self.nodes.insert(Node {
                    task,
                    prev,
                    next: cur,
                });
                self.nodes[prev].next = key;
                self.nodes[cur].prev = key;
            }
        }
        key
    }

    /// 摘除节点；摘除 current 时 current 移到其后继
    fn unlink(&mut self, key: usize) -> Arc<Task> {
        let node = self.nodes.remove(key);
        if node.next == key {
            self.current = None;
        } else {
            self.nodes[node.prev].next = node.next;
            self.nodes[node.next].prev = node.prev;
            if self.current == Some(key) {
                self.current = Some(node.next);
            }
        }
        node.task
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// 单个核的调度状态
pub struct CpuSched {
    ring: SpinLock<ReadyRing>,
    inbox: SpinLock<VecDeque<IpiMessage>>,
    inbox_capacity: usize,
    /// FPU 状态所属进程，0 表示无
    fpu_owner: AtomicUsize,
}

impl CpuSched {
    fn new(inbox_capacity: usize) -> Self {
        Self {
            ring: SpinLock::new(ReadyRing::new()),
            inbox: SpinLock::new(VecDeque::with_capacity(inbox_capacity)),
            inbox_capacity,
            fpu_owner: AtomicUsize::new(0),
        }
    }
}

/// 全部核的调度器
pub struct Scheduler {
    cpus: Vec<CpuSched>,
}

impl Scheduler {
    /// 为 `cpu_count` 个核创建调度器，每核收件箱容量为 `inbox_capacity`
    pub fn new(cpu_count: usize, inbox_capacity: usize) -> Self {
        Self {
            cpus: (0..cpu_count).map(|_| CpuSched::new(inbox_capacity)).collect(),
        }
    }

    /// 核数
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    fn cpu(&self, cpu: usize) -> TaskResult<&CpuSched> {
        self.cpus.get(cpu).ok_or(TaskError::InvalidCpu)
    }

    /// 把任务接纳进 `cpu` 的就绪环
    pub fn admit(&self, cpu: usize, task: Arc<Task>) -> TaskResult<()> {
        let sched = self.cpu(cpu)?;
        task.set_cpu(cpu);
        sched.ring.lock().insert(task);
        Ok(())
    }

    /// 选出 `cpu` 上下一个要运行的任务
    ///
    /// 从 current 的后继开始扫描：退出中的任务被摘除并回收，睡眠的任务跳过，
    /// 第一个就绪的任务成为 current 并返回。绕回 current 时若它仍就绪则继续运行它。
    pub fn sched_run_next(&self, cpu: usize) -> Option<Arc<Task>> {
        let sched = self.cpus.get(cpu)?;
        let mut reaped = Vec::new();

        let next = {
            let mut ring = sched.ring.lock();
            loop {
                let Some(cur) = ring.current else {
                    break None;
                };
                let mut key = ring.nodes[cur].next;
                let mut chosen = None;
                while key != cur {
                    let next = ring.nodes[key].next;
                    let task = &ring.nodes[key].task;
                    if task.is_exiting() {
                        reaped.push(ring.unlink(key));
                    } else if task.state() == TaskState::Ready {
                        chosen = Some(key);
                        break;
                    }
                    key = next;
                }

                if let Some(key) = chosen {
                    ring.current = Some(key);
                    break Some(ring.nodes[key].task.clone());
                }
                // 绕回 current
                let task = &ring.nodes[cur].task;
                if task.is_exiting() {
                    reaped.push(ring.unlink(cur));
                    continue;
                }
                break (task.state() == TaskState::Ready).then(|| task.clone());
            }
        };

        // 在环锁之外释放：最后一个句柄会拆除整个进程
        for task in reaped {
            task.set_state(TaskState::Exiting);
            log::debug!("sched: cpu {} reaped task {}", cpu, task.tid());
            drop(task);
        }
        next
    }

    /// 在 `cpu` 上调度任务：本核直接接纳，否则投递到目标核并发送 IPI
    pub fn schedule_on(&self, cpu: usize, task: Arc<Task>) -> TaskResult<()> {
        if cpu == task_ops().current_cpu() {
            return self.admit(cpu, task);
        }
        self.post(cpu, IpiMessage::Schedule(task))
    }

    /// 请求 `cpu` 失效一段虚拟地址的 TLB 条目
    pub fn flush_tlb_range(&self, cpu: usize, start: Vaddr, pages: usize) -> TaskResult<()> {
        self.post(cpu, IpiMessage::TlbFlush { start, pages })
    }

    fn post(&self, cpu: usize, msg: IpiMessage) -> TaskResult<()> {
        let sched = self.cpu(cpu)?;
        {
            let mut inbox = sched.inbox.lock();
            if inbox.len() >= sched.inbox_capacity {
                return Err(TaskError::QueueFull);
            }
            inbox.push_back(msg);
        }
        task_ops().send_ipi(cpu);
        Ok(())
    }

    /// 按到达顺序执行 `cpu` 收件箱中的全部消息，返回执行的条数
    pub fn drain_ipi(&self, cpu: usize) -> TaskResult<usize> {
        let sched = self.cpu(cpu)?;
        let msgs = core::mem::take(&mut *sched.inbox.lock());
        let n = msgs.len();
        for msg in msgs {
            match msg {
                IpiMessage::TlbFlush { start, pages } => {
                    for i in 0..pages {
                        mm::arch_ops().flush_tlb_local(start.as_usize() + i * PAGE_SIZE);
                    }
                }
                IpiMessage::Schedule(task) => self.admit(cpu, task)?,
            }
        }
        Ok(n)
    }

    /// `cpu` 收件箱中待处理的消息数
    pub fn pending_ipi(&self, cpu: usize) -> usize {
        self.cpus.get(cpu).map_or(0, |s| s.inbox.lock().len())
    }

    /// 唤醒睡眠的任务，状态改变时返回 `true`
    pub fn wake(&self, task: &Task) -> bool {
        task.transition(TaskState::Sleeping, TaskState::Ready)
    }

    /// `cpu` 的当前任务
    pub fn current(&self, cpu: usize) -> Option<Arc<Task>> {
        let ring = self.cpus.get(cpu)?.ring.lock();
        ring.current.map(|key| ring.nodes[key].task.clone())
    }

    /// `cpu` 就绪环中的任务数（含睡眠的）
    pub fn ring_len(&self, cpu: usize) -> usize {
        self.cpus.get(cpu).map_or(0, |s| s.ring.lock().len())
    }

    /// `cpu` 的 FPU 状态所属进程
    pub fn fpu_owner(&self, cpu: usize) -> Option<Pid> {
        match self.cpus.get(cpu)?.fpu_owner.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// 记录 `cpu` 的 FPU 状态属于 `pid`
    pub fn set_fpu_owner(&self, cpu: usize, pid: Pid) -> TaskResult<()> {
        self.cpu(cpu)?.fpu_owner.store(pid, Ordering::Release);
        Ok(())
    }

    /// 在所有核上清除 `pid` 的 FPU 关联，返回清除的核数
    pub fn clear_fpu_owner(&self, pid: Pid) -> usize {
        self.cpus
            .iter()
            .filter(|s| {
                s.fpu_owner
                    .compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Process, ProcessTable};
    use crate::task::Context;
    use crate::test_init;
    use mm::AddressSpace;
    use test_support::mock::task::MOCK_TASK_OPS;
    use vfs::FileTable;

    fn spawn(table: &Arc<ProcessTable>) -> Arc<Task> {
        test_init::init();
        let pid = table.alloc_pid();
        let p = Process::new(
            pid,
            pid,
            0,
            AddressSpace::new().unwrap(),
            FileTable::new(2),
            test_init::root_tnode(),
        );
        let handle = table.register(p).unwrap();
        Task::new(handle, Context::new(0x1000, 0x8000), 0)
    }

    #[test]
    fn test_reaps_exiting_and_dispatches_next_ready() {
        let table = ProcessTable::new();
        let sched = Scheduler::new(1, 4);
        let p1 = spawn(&table);
        let p2 = spawn(&table);
        let p3 = spawn(&table);
        let p2_pid = p2.process().pid();

        sched.admit(0, p1.clone()).unwrap();
        sched.admit(0, p2.clone()).unwrap();
        sched.admit(0, p3.clone()).unwrap();
        assert!(Arc::ptr_eq(&sched.current(0).unwrap(), &p1));

        p2.process().mark_exiting();
        drop(p2);

        let next = sched.sched_run_next(0).unwrap();
        assert!(Arc::ptr_eq(&next, &p3));
        assert_eq!(sched.ring_len(0), 2);
        assert!(table.lookup(p2_pid).is_none());
    }

    #[test]
    fn test_sleeping_skipped_and_current_redispatched() {
        let table = ProcessTable::new();
        let sched = Scheduler::new(1, 4);
        let a = spawn(&table);
        let b = spawn(&table);
        sched.admit(0, a.clone()).unwrap();
        sched.admit(0, b.clone()).unwrap();

        b.set_state(TaskState::Sleeping);
        let next = sched.sched_run_next(0).unwrap();
        assert!(Arc::ptr_eq(&next, &a));

        a.set_state(TaskState::Sleeping);
        assert!(sched.sched_run_next(0).is_none());

        assert!(sched.wake(&b));
        assert!(!sched.wake(&b));
        assert!(Arc::ptr_eq(&sched.sched_run_next(0).unwrap(), &b));
    }

    #[test]
    fn test_exiting_current_is_removed() {
        let table = ProcessTable::new();
        let sched = Scheduler::new(1, 4);
        let only = spawn(&table);
        sched.admit(0, only.clone()).unwrap();
        only.set_state(TaskState::Exiting);
        drop(only);
        assert!(sched.sched_run_next(0).is_none());
        assert_eq!(sched.ring_len(0), 0);
        assert!(sched.current(0).is_none());
    }

    #[test]
    fn test_remote_schedule_goes_through_inbox() {
        let table = ProcessTable::new();
        let sched = Scheduler::new(2, 2);
        let t = spawn(&table);

        let before = MOCK_TASK_OPS.ipis();
        sched.schedule_on(1, t.clone()).unwrap();
        assert!(MOCK_TASK_OPS.ipis() > before);
        assert_eq!(sched.ring_len(1), 0);
        assert_eq!(sched.pending_ipi(1), 1);

        sched
            .flush_tlb_range(1, Vaddr::from_usize(0x4000), 3)
            .unwrap();
        assert_eq!(
            sched.flush_tlb_range(1, Vaddr::from_usize(0x8000), 1),
            Err(TaskError::QueueFull)
        );

        assert_eq!(sched.drain_ipi(1).unwrap(), 2);
        assert_eq!(sched.pending_ipi(1), 0);
        assert_eq!(sched.ring_len(1), 1);
        assert_eq!(t.cpu(), 1);
        assert_eq!(sched.schedule_on(5, t), Err(TaskError::InvalidCpu));
    }

    #[test]
    fn test_local_schedule_admits_directly() {
        let table = ProcessTable::new();
        let sched = Scheduler::new(2, 2);
        let t = spawn(&table);
        sched.schedule_on(0, t).unwrap();
        assert_eq!(sched.ring_len(0), 1);
        assert_eq!(sched.pending_ipi(0), 0);
    }

    #[test]
    fn test_fpu_owner_cleared_everywhere() {
        let sched = Scheduler::new(3, 1);
        sched.set_fpu_owner(0, 7).unwrap();
        sched.set_fpu_owner(2, 7).unwrap();
        sched.set_fpu_owner(1, 9).unwrap();
        assert_eq!(sched.clear_fpu_owner(7), 2);
        assert_eq!(sched.fpu_owner(0), None);
        assert_eq!(sched.fpu_owner(1), Some(9));
    }
}
