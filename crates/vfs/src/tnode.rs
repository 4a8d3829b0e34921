//! Tnode：文件系统树中的具名节点
//!
//! 每个 tnode 持有一个 inode、指向父节点的弱引用和一个子节点缓存。
//! 父指针在创建时确定，树因此不会成环。挂载到某个目录 tnode 上的超级块
//! 记录在 `mounted` 中，路径解析经过该节点时会转入被挂载文件系统的根。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use sync::SpinLock;
use uapi::fcntl::OpenFlags;

use crate::{File, FsError, FsResult, Inode, SuperBlock};

/// 文件系统树节点
pub struct Tnode {
    name: String,
    inode: Arc<Inode>,
    parent: Weak<Tnode>,
    children: SpinLock<BTreeMap<String, Arc<Tnode>>>,
    mounted: SpinLock<Option<Arc<SuperBlock>>>,
}

impl Tnode {
    /// 创建没有父节点的根 tnode
    pub fn new_root(inode: Arc<Inode>) -> Arc<Self> {
        Arc::new(Self {
            name: String::from("/"),
            inode,
            parent: Weak::new(),
            children: SpinLock::new(BTreeMap::new()),
            mounted: SpinLock::new(None),
        })
    }

    /// 创建 `parent` 下名为 `name` 的 tnode（不加入父节点缓存）
    pub fn new(name: &str, inode: Arc<Inode>, parent: &Arc<Tnode>) -> Arc<Self> {
        Arc::new(Self {
            name: String::from(name),
            inode,
            parent: Arc::downgrade(parent),
            children: SpinLock::new(BTreeMap::new()),
            mounted: SpinLock::new(None),
        })
    }

    /// 节点名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 节点指向的 inode
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 同一文件系统内的父节点；文件系统根返回 `None`
    pub fn parent(&self) -> Option<Arc<Tnode>> {
        self.parent.upgrade()
    }

    /// 查找子节点
    ///
    /// 先查缓存，未命中时调用驱动的 `lookup` 并把结果放入缓存。
    /// 同名的两次查找返回同一个 tnode，因而也是同一个 inode。
    pub fn lookup(self: &Arc<Self>, name: &str) -> FsResult<Arc<Tnode>> {
        if !self.inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        if let Some(child) = self.children.lock().get(name) {
            return Ok(child.clone());
        }

        let child = self
            .inode
            .ops()
            .lookup(self, name)
            .ok_or(FsError::NotFound)?;

        // 并发查找时保留先放入缓存的那个
        let mut children = self.children.lock();
        Ok(children
            .entry(String::from(name))
            .or_insert(child)
            .clone())
    }

    /// 在此目录下创建普通文件，返回其 tnode
    pub fn create(self: &Arc<Self>, name: &str, perm: u32) -> FsResult<Arc<Tnode>> {
        if !self.inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        self.inode.ops().create(&self.inode, name, perm)?;
        self.lookup(name)
    }

    /// 在此目录下创建子目录，返回其 tnode
    pub fn mkdir(self: &Arc<Self>, name: &str, perm: u32) -> FsResult<Arc<Tnode>> {
        if !self.inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        self.inode.ops().mkdir(&self.inode, name, perm)?;
        self.lookup(name)
    }

    /// 打开此节点
    pub fn open(&self, flags: OpenFlags) -> FsResult<Arc<File>> {
        self.inode.ops().open(&self.inode, flags)
    }

    /// 将已创建的子节点放入缓存；同名已存在时返回 `AlreadyExists`
    pub fn add_child(&self, child: Arc<Tnode>) -> FsResult<()> {
        let mut children = self.children.lock();
        if children.contains_key(child.name()) {
            return Err(FsError::AlreadyExists);
        }
        children.insert(String::from(child.name()), child);
        Ok(())
    }

    /// 从缓存中移除子节点
    pub fn remove_child(&self, name: &str) -> Option<Arc<Tnode>> {
        self.children.lock().remove(name)
    }

    /// 已缓存的子节点快照
    pub fn children(&self) -> Vec<Arc<Tnode>> {
        self.children.lock().values().cloned().collect()
    }

    /// 按驱动的目录列表补齐子节点缓存，返回子节点个数
    pub fn populate(self: &Arc<Self>) -> FsResult<usize> {
        let entries = self.inode.ops().readdir(&self.inode)?;
        for entry in &entries {
            self.lookup(&entry.name)?;
        }
        Ok(self.children.lock().len())
    }

    /// 挂载在此节点上的超级块
    pub fn mounted(&self) -> Option<Arc<SuperBlock>> {
        self.mounted.lock().clone()
    }

    pub(crate) fn set_mounted(&self, sb: Option<Arc<SuperBlock>>) -> Option<Arc<SuperBlock>> {
        core::mem::replace(&mut *self.mounted.lock(), sb)
    }

    /// 沿挂载链下行，返回最上层文件系统在此处的根
    pub fn follow_mounts(self: &Arc<Self>) -> Arc<Tnode> {
        let mut cur = self.clone();
        while let Some(sb) = cur.mounted() {
            cur = sb.root().clone();
        }
        cur
    }

    /// 跨越挂载点的父节点
    ///
    /// 文件系统根的父节点是其挂载点的父节点；全局根返回 `None`。
    pub fn parent_across_mounts(&self) -> Option<Arc<Tnode>> {
        if let Some(parent) = self.parent() {
            return Some(parent);
        }
        let mut covered = self.inode.superblock()?.mountpoint()?;
        loop {
            if let Some(parent) = covered.parent() {
                return Some(parent);
            }
            covered = covered.inode.superblock()?.mountpoint()?;
        }
    }
}

impl core::fmt::Debug for Tnode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tnode")
            .field("name", &self.name)
            .field("inode", &self.inode.index())
            .finish()
    }
}
