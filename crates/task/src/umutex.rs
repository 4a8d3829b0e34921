//! 用户态互斥量（futex 风格）
//!
//! 表以用户互斥量字的物理地址为键，因此映射到同一物理页的不同进程共享同一表项。
//! 每个物理地址至多一个表项；表项由创建它的进程登记在其互斥量列表中，
//! 并以弱引用指回该进程。
//!
//! # 锁顺序
//!
//! 地址空间 → 互斥量表 → 表项等待队列 → 进程互斥量列表。
//! 返回给调用者的 [`LockedUserMutex`] 持有表项等待队列锁。

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use mm::{AddressSpace, Vaddr};
use sync::{ArcSpinMutexGuard, SpinLock, SpinMutex};

use crate::process::{Process, ProcessHandle};
use crate::task::{Task, TaskState};
use crate::{TaskError, TaskResult};

/// 等待队列只持有弱引用：睡眠的任务仍在就绪环中，被回收后自动从队列中失效
type WaitQueue = VecDeque<Weak<Task>>;

fn prune(queue: &mut WaitQueue) {
    queue.retain(|w| w.strong_count() > 0);
}

/// 一个用户互斥量表项
pub struct UserMutex {
    key: usize,
    waiters: Arc<SpinMutex<WaitQueue>>,
    owner: Weak<Process>,
    table: Weak<UserMutexTable>,
}

impl UserMutex {
    /// 用户互斥量字的物理地址
    pub fn key(&self) -> usize {
        self.key
    }

    /// 创建它的进程（可能已退出）
    pub fn owner(&self) -> Option<Arc<Process>> {
        self.owner.upgrade()
    }

    fn detach_from_owner(self: &Arc<Self>) {
        if let Some(owner) = self.owner.upgrade() {
            owner.mutexes.lock().retain(|m| !Arc::ptr_eq(m, self));
        }
    }
}

impl core::fmt::Debug for UserMutex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserMutex")
            .field("key", &format_args!("{:#x}", self.key))
            .finish()
    }
}

/// 持有等待队列锁的表项
///
/// 析构时释放队列锁，队列为空则从表中删除该表项，最后释放被唤醒任务的引用。
pub struct LockedUserMutex {
    queue: ManuallyDrop<ArcSpinMutexGuard<WaitQueue>>,
    woken: Vec<Arc<Task>>,
    entry: Arc<UserMutex>,
}

impl LockedUserMutex {
    /// 表项
    pub fn entry(&self) -> &Arc<UserMutex> {
        &self.entry
    }

    /// 仍然存活的等待者个数
    pub fn waiters(&self) -> usize {
        self.queue.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// 唤醒至多 `n` 个等待者，返回实际唤醒数
    ///
    /// 队列因此变空时清除 `still_waiting`。
    pub fn wake(&mut self, n: usize, still_waiting: Option<&AtomicBool>) -> usize {
        let mut woken = 0;
        while woken < n {
            let Some(waiter) = self.queue.pop_front() else {
                break;
            };
            if let Some(task) = waiter.upgrade() {
                task.transition(TaskState::Sleeping, TaskState::Ready);
                self.woken.push(task);
                woken += 1;
            }
        }
        prune(&mut self.queue);
        if self.queue.is_empty()
            && let Some(flag) = still_waiting
        {
            flag.store(false, Ordering::Release);
        }
        woken
    }

    /// 把任务挂入等待队列并释放队列锁
    pub fn wait(mut self, task: Arc<Task>) {
        task.set_state(TaskState::Sleeping);
        self.queue.push_back(Arc::downgrade(&task));
    }

    /// 释放队列锁；队列为空时从表中删除该表项
    pub fn unlock(self) {
        drop(self);
    }

    fn new(queue: ArcSpinMutexGuard<WaitQueue>, entry: Arc<UserMutex>) -> Self {
        Self {
            queue: ManuallyDrop::new(queue),
            woken: Vec::new(),
            entry,
        }
    }
}

impl Drop for LockedUserMutex {
    fn drop(&mut self) {
        prune(&mut self.queue);
        let idle = self.queue.is_empty();
        // SAFETY: 队列锁只在此处释放一次，之后不再访问 `self.queue`
        unsafe { ManuallyDrop::drop(&mut self.queue) };
        // remove_if_idle 先取表锁再取队列锁，必须在释放队列锁之后调用
        if idle && let Some(table) = self.entry.table.upgrade() {
            table.remove_if_idle(&self.entry);
        }
        self.woken.clear();
    }
}

/// [`UserMutexTable::release_or_write`] 的结果
pub enum Release {
    /// 没有等待者，值已写回用户内存
    FullyReleased,
    /// 有等待者，返回持锁的表项
    Contended(LockedUserMutex),
}

/// 用户互斥量表
pub struct UserMutexTable {
    entries: SpinLock<HashMap<usize, Arc<UserMutex>>>,
}

impl UserMutexTable {
    /// 创建空表
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: SpinLock::new(HashMap::new()),
        })
    }

    /// 表项个数
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 是否没有表项
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 查找表项（不加锁）
    pub fn get(&self, key: usize) -> Option<Arc<UserMutex>> {
        self.entries.lock().get(&key).cloned()
    }

    /// 查找或创建 `vaddr` 对应的表项，返回时持有其等待队列锁
    ///
    /// 地址按写访问翻译，无效或只读的地址在接触表之前失败；
    /// 表增长失败返回 `OutOfMemory`。
    pub fn lock_or_create(
        self: &Arc<Self>,
        space: &mut AddressSpace,
        owner: &ProcessHandle,
        vaddr: Vaddr,
    ) -> TaskResult<LockedUserMutex> {
        let key = space.translate_user(vaddr, true)?.as_usize();

        let mut entries = self.entries.lock();
        let entry = match entries.get(&key) {
            Some(entry) => entry.clone(),
            None => {
                entries
                    .try_reserve(1)
                    .map_err(|_| TaskError::OutOfMemory)?;
                let entry = Arc::new(UserMutex {
                    key,
                    waiters: Arc::new(SpinMutex::new(VecDeque::new())),
                    owner: owner.downgrade(),
                    table: Arc::downgrade(self),
                });
                {
                    let mut owned = owner.mutexes.lock();
                    owned.try_reserve(1).map_err(|_| TaskError::OutOfMemory)?;
                    owned.push(entry.clone());
                }
                entries.insert(key, entry.clone());
                log::trace!("umutex: created entry {:#x}", key);
                entry
            }
        };
        let queue = entry.waiters.lock_arc();
        drop(entries);
        Ok(LockedUserMutex::new(queue, entry))
    }

    /// 释放 `vaddr` 处的用户互斥量
    ///
    /// 没有表项或表项的等待者都已退出时写入 `value` 并返回 `FullyReleased`
    /// （后者同时删除表项）；有等待者时不写入，返回持锁的表项。
    pub fn release_or_write(
        &self,
        space: &mut AddressSpace,
        vaddr: Vaddr,
        value: u32,
    ) -> TaskResult<Release> {
        let key = space.translate_user(vaddr, true)?.as_usize();

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(&key).cloned() else {
            space.write_u32(vaddr, value)?;
            return Ok(Release::FullyReleased);
        };

        let mut queue = entry.waiters.lock_arc();
        prune(&mut queue);
        if !queue.is_empty() {
            drop(entries);
            return Ok(Release::Contended(LockedUserMutex::new(queue, entry)));
        }

        space.write_u32(vaddr, value)?;
        entries.remove(&key);
        entry.detach_from_owner();
        drop(queue);
        drop(entries);
        log::trace!("umutex: released entry {:#x}", key);
        Ok(Release::FullyReleased)
    }

    fn remove_if_idle(&self, entry: &Arc<UserMutex>) {
        let mut entries = self.entries.lock();
        if !entries
            .get(&entry.key)
            .is_some_and(|e| Arc::ptr_eq(e, entry))
        {
            return;
        }
        let mut queue = entry.waiters.lock();
        prune(&mut queue);
        if queue.is_empty() {
            entries.remove(&entry.key);
            entry.detach_from_owner();
        }
    }
}

/// 释放进程登记的全部表项，返回释放的个数
///
/// 表项上仍在等待的任务被唤醒。
pub fn release_owned(process: &Process) -> usize {
    let owned = core::mem::take(&mut *process.mutexes.lock());
    let n = owned.len();
    let mut woken = Vec::new();
    for entry in owned {
        let Some(table) = entry.table.upgrade() else {
            continue;
        };
        let mut entries = table.entries.lock();
        if entries
            .get(&entry.key)
            .is_some_and(|e| Arc::ptr_eq(e, &entry))
        {
            entries.remove(&entry.key);
        }
        let mut queue = entry.waiters.lock();
        for task in queue.drain(..).filter_map(|w| w.upgrade()) {
            task.transition(TaskState::Sleeping, TaskState::Ready);
            woken.push(task);
        }
    }
    // 所有锁已释放后再放开任务引用
    drop(woken);
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessTable;
    use crate::task::Context;
    use crate::test_init;
    use mm::{MemoryObject, MmError, RegionType, VmFlags, VmRegion};
    use vfs::FileTable;

    const WORD: usize = 0x10_0040;

    fn user_process(table: &Arc<ProcessTable>) -> ProcessHandle {
        test_init::init();
        let mut space = AddressSpace::new().unwrap();
        space
            .map_region(
                VmRegion::from_addrs(
                    0x10_0000,
                    0x10_2000,
                    VmFlags::USER | VmFlags::WRITABLE,
                    RegionType::UserData,
                )
                .unwrap()
                .with_object(MemoryObject::anonymous(), 0),
            )
            .unwrap();
        let pid = table.alloc_pid();
        let p = Process::new(
            pid,
            pid,
            0,
            space,
            FileTable::new(1),
            test_init::root_tnode(),
        );
        table.register(p).unwrap()
    }

    #[test]
    fn test_release_after_waiter_exits_writes_and_deletes() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let va = Vaddr::from_usize(WORD);
        let t = Task::new(p.clone(), Context::default(), 0);

        let mut space = p.space().lock();
        let locked = table.lock_or_create(&mut space, &p, va).unwrap();
        let entry = locked.entry().clone();
        locked.wait(t.clone());
        assert_eq!(table.len(), 1);
        assert!(p.owns_mutex(&entry));

        // 等待者被回收后表项不再算作有竞争
        drop(t);
        let r = table.release_or_write(&mut space, va, 5).unwrap();
        assert!(matches!(r, Release::FullyReleased));
        assert_eq!(space.read_u32(va), Ok(5));
        assert!(table.is_empty());
        assert!(!p.owns_mutex(&entry));
        assert_eq!(p.mutex_count(), 0);
    }

    #[test]
    fn test_dropped_guard_removes_idle_entry() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let va = Vaddr::from_usize(WORD + 20);

        let mut space = p.space().lock();
        let locked = table.lock_or_create(&mut space, &p, va).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(p.mutex_count(), 1);
        drop(locked);
        assert!(table.is_empty());
        assert_eq!(p.mutex_count(), 0);

        // 早退路径上丢弃的表项同样被删除
        let mut early = || -> TaskResult<()> {
            let _locked = table.lock_or_create(&mut space, &p, va)?;
            Err(TaskError::Mm(MmError::InvalidAddress))
        };
        assert!(early().is_err());
        assert!(table.is_empty());
        assert_eq!(p.mutex_count(), 0);
    }

    #[test]
    fn test_release_without_entry_just_writes() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let va = Vaddr::from_usize(WORD + 4);
        let mut space = p.space().lock();
        assert!(matches!(
            table.release_or_write(&mut space, va, 9).unwrap(),
            Release::FullyReleased
        ));
        assert_eq!(space.read_u32(va), Ok(9));
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_address_fails_before_table() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let mut space = p.space().lock();
        let err = table
            .lock_or_create(&mut space, &p, Vaddr::from_usize(0x9000_0000))
            .err()
            .unwrap();
        assert_eq!(err, TaskError::Mm(MmError::InvalidAddress));
        assert!(table.is_empty());
        assert_eq!(p.mutex_count(), 0);
    }

    #[test]
    fn test_read_only_word_fails_before_table() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let mut space = p.space().lock();
        space
            .map_region(
                VmRegion::from_addrs(0x30_0000, 0x30_1000, VmFlags::USER, RegionType::UserData)
                    .unwrap()
                    .with_object(MemoryObject::anonymous(), 0),
            )
            .unwrap();

        let va = Vaddr::from_usize(0x30_0000);
        assert_eq!(space.read_u32(va), Ok(0));
        let err = table.lock_or_create(&mut space, &p, va).err().unwrap();
        assert_eq!(err, TaskError::Mm(MmError::InvalidAddress));
        assert!(table.is_empty());
        assert_eq!(p.mutex_count(), 0);
    }

    #[test]
    fn test_one_entry_per_physical_address() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let a = user_process(&procs);
        let b = user_process(&procs);
        let shared = VmRegion::from_addrs(
            0x20_0000,
            0x20_1000,
            VmFlags::USER | VmFlags::WRITABLE,
            RegionType::UserShared,
        )
        .unwrap()
        .with_object(MemoryObject::anonymous(), 0);
        a.space().lock().map_region(shared).unwrap();
        {
            let src = a.space().lock();
            b.space()
                .lock()
                .clone_shared(&src, RegionType::UserShared)
                .unwrap();
        }

        let va = Vaddr::from_usize(0x20_0010);
        let ta = Task::new(a.clone(), Context::default(), 0);
        let ea = {
            let mut space = a.space().lock();
            let locked = table.lock_or_create(&mut space, &a, va).unwrap();
            let entry = locked.entry().clone();
            locked.wait(ta.clone());
            entry
        };
        let eb = {
            let mut space = b.space().lock();
            let locked = table.lock_or_create(&mut space, &b, va).unwrap();
            locked.entry().clone()
        };
        assert!(Arc::ptr_eq(&ea, &eb));
        assert_eq!(table.len(), 1);
        assert!(a.owns_mutex(&ea));
        assert!(!b.owns_mutex(&ea));
    }

    #[test]
    fn test_wait_then_contended_wake() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let va = Vaddr::from_usize(WORD + 8);
        let t1 = Task::new(p.clone(), Context::default(), 0);
        let t2 = Task::new(p.clone(), Context::default(), 0);

        let mut space = p.space().lock();
        table
            .lock_or_create(&mut space, &p, va)
            .unwrap()
            .wait(t1.clone());
        table
            .lock_or_create(&mut space, &p, va)
            .unwrap()
            .wait(t2.clone());
        assert_eq!(t1.state(), TaskState::Sleeping);

        let Release::Contended(mut locked) = table.release_or_write(&mut space, va, 3).unwrap()
        else {
            panic!("expected contended release");
        };
        assert_eq!(space.read_u32(va), Ok(0));
        assert_eq!(locked.waiters(), 2);

        let flag = AtomicBool::new(true);
        assert_eq!(locked.wake(1, Some(&flag)), 1);
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(t1.state(), TaskState::Ready);
        assert_eq!(t2.state(), TaskState::Sleeping);
        assert_eq!(locked.wake(5, Some(&flag)), 1);
        assert!(!flag.load(Ordering::Acquire));
        locked.unlock();

        assert!(table.is_empty());
        assert_eq!(p.mutex_count(), 0);
    }

    #[test]
    fn test_unlock_keeps_entry_with_waiters() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let va = Vaddr::from_usize(WORD + 12);
        let t = Task::new(p.clone(), Context::default(), 0);

        let mut space = p.space().lock();
        table.lock_or_create(&mut space, &p, va).unwrap().wait(t.clone());
        table.lock_or_create(&mut space, &p, va).unwrap().unlock();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_release_owned_wakes_and_frees() {
        let procs = ProcessTable::new();
        let table = UserMutexTable::new();
        let p = user_process(&procs);
        let t = Task::new(p.clone(), Context::default(), 0);
        {
            let mut space = p.space().lock();
            table
                .lock_or_create(&mut space, &p, Vaddr::from_usize(WORD))
                .unwrap()
                .wait(t.clone());
            table
                .lock_or_create(&mut space, &p, Vaddr::from_usize(WORD + 16))
                .unwrap()
                .unlock();
        }
        assert_eq!(p.mutex_count(), 1);
        assert_eq!(release_owned(&p), 1);
        assert!(table.is_empty());
        assert_eq!(t.state(), TaskState::Ready);
    }
}
