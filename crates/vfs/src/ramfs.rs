//! 内存文件系统
//!
//! 目录和文件内容都保存在 inode 的私有数据中。每次挂载得到一棵独立的树；
//! 可以给驱动一份初始文件列表，每次挂载时根目录都以这些文件开始。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use sync::SpinLock;

use crate::dev::DeviceId;
use crate::superblock::ROOT_INODE_INDEX;
use crate::{
    DirEntry, File, FileMode, FileOps, FileSystemDriver, FsError, FsResult, Inode, InodeKind,
    InodeOps, SuperBlock, Tnode,
};

/// ramfs 节点数据
enum RamNode {
    Dir(SpinLock<BTreeMap<String, Arc<Inode>>>),
    File(SpinLock<Vec<u8>>),
}

struct RamfsOps;

fn new_inode(
    index: usize,
    kind: InodeKind,
    perm: u32,
    sb: Weak<SuperBlock>,
    content: Vec<u8>,
) -> Inode {
    let size = content.len();
    let node = match kind {
        InodeKind::Directory => RamNode::Dir(SpinLock::new(BTreeMap::new())),
        _ => RamNode::File(SpinLock::new(content)),
    };
    Inode::new(
        index,
        kind,
        FileMode::with_kind(kind, perm),
        sb,
        Arc::new(RamfsOps),
    )
    .with_size(size)
    .with_private(Arc::new(node))
}

fn dir_entries(inode: &Inode) -> FsResult<&SpinLock<BTreeMap<String, Arc<Inode>>>> {
    match inode.private::<RamNode>() {
        Some(RamNode::Dir(entries)) => Ok(entries),
        Some(RamNode::File(_)) => Err(FsError::NotDirectory),
        None => Err(FsError::InvalidOperation),
    }
}

fn file_data(inode: &Inode) -> FsResult<&SpinLock<Vec<u8>>> {
    match inode.private::<RamNode>() {
        Some(RamNode::File(data)) => Ok(data),
        Some(RamNode::Dir(_)) => Err(FsError::IsDirectory),
        None => Err(FsError::InvalidOperation),
    }
}

impl RamfsOps {
    fn insert(
        &self,
        dir: &Arc<Inode>,
        name: &str,
        kind: InodeKind,
        perm: u32,
    ) -> FsResult<Arc<Inode>> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(FsError::InvalidArgument);
        }
        let sb = dir.superblock().ok_or(FsError::NoDevice)?;
        let entries = dir_entries(dir)?;
        let mut entries = entries.lock();
        if entries.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        let inode = Arc::new(new_inode(
            sb.alloc_index(),
            kind,
            perm,
            dir.superblock_weak(),
            Vec::new(),
        ));
        entries.insert(String::from(name), inode.clone());
        Ok(inode)
    }
}

impl InodeOps for RamfsOps {
    fn lookup(&self, dir: &Arc<Tnode>, name: &str) -> Option<Arc<Tnode>> {
        let inode = dir_entries(dir.inode()).ok()?.lock().get(name).cloned()?;
        Some(Tnode::new(name, inode, dir))
    }

    fn readdir(&self, dir: &Inode) -> FsResult<Vec<DirEntry>> {
        let entries = dir_entries(dir)?.lock();
        Ok(entries
            .iter()
            .map(|(name, inode)| inode.dir_entry(name))
            .collect())
    }

    fn file_ops(&self, inode: &Arc<Inode>) -> Option<Arc<dyn FileOps>> {
        match inode.private::<RamNode>() {
            Some(RamNode::File(_)) => Some(Arc::new(RamfsOps)),
            _ => None,
        }
    }

    fn create(&self, dir: &Arc<Inode>, name: &str, perm: u32) -> FsResult<Arc<Inode>> {
        self.insert(dir, name, InodeKind::File, perm)
    }

    fn mkdir(&self, dir: &Arc<Inode>, name: &str, perm: u32) -> FsResult<Arc<Inode>> {
        self.insert(dir, name, InodeKind::Directory, perm)
    }
}

impl FileOps for RamfsOps {
    fn read(&self, file: &File, offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        let data = file_data(file.inode())?.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, file: &File, offset: usize, buf: &[u8]) -> FsResult<usize> {
        let end = offset.checked_add(buf.len()).ok_or(FsError::InvalidArgument)?;
        let mut data = file_data(file.inode())?.lock();
        let len = data.len();
        if len < end {
            data.try_reserve(end - len)
                .map_err(|_| FsError::OutOfMemory)?;
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        file.inode().set_size(data.len());
        Ok(buf.len())
    }
}

/// ramfs 驱动
#[derive(Default)]
pub struct RamFs {
    initial: Vec<(String, Vec<u8>)>,
}

impl RamFs {
    /// 根目录为空的 ramfs
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 每次挂载时根目录都含有 `files` 中的普通文件
    pub fn with_files(files: Vec<(String, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self { initial: files })
    }
}

impl FileSystemDriver for RamFs {
    fn fs_name(&self) -> &'static str {
        "ramfs"
    }

    fn mount(self: Arc<Self>, device: Option<DeviceId>) -> FsResult<Arc<SuperBlock>> {
        let initial = self.initial.clone();
        let sb = SuperBlock::new(self, device, |weak| {
            new_inode(
                ROOT_INODE_INDEX,
                InodeKind::Directory,
                0o755,
                weak.clone(),
                Vec::new(),
            )
        });

        let root = sb.root().inode();
        let entries = dir_entries(root)?;
        let mut entries = entries.lock();
        for (name, content) in initial {
            let inode = new_inode(
                sb.alloc_index(),
                InodeKind::File,
                0o644,
                Arc::downgrade(&sb),
                content,
            );
            if entries.insert(name, Arc::new(inode)).is_some() {
                return Err(FsError::AlreadyExists);
            }
        }
        drop(entries);
        Ok(sb)
    }
}
