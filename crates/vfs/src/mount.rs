//! 挂载表
//!
//! 第一次挂载到 `/` 的文件系统成为全局根；之后的挂载都挂在已存在的目录 tnode 上。
//! 挂载时按根目录的列表为挂载根建立子 tnode。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use sync::SpinLock;

use crate::dev::DeviceId;
use crate::path::{normalize_path, resolve};
use crate::{FileSystemDriver, FsError, FsResult, SuperBlock, Tnode};

/// 挂载点记录
#[derive(Debug, Clone)]
pub struct MountPoint {
    /// 规范化后的挂载路径
    pub path: String,
    /// 挂载的超级块
    pub superblock: Arc<SuperBlock>,
    /// 被覆盖的目录；根挂载没有
    pub covered: Option<Arc<Tnode>>,
}

/// 挂载表
pub struct MountTable {
    mounts: SpinLock<Vec<MountPoint>>,
}

impl MountTable {
    /// 创建空挂载表
    pub const fn new() -> Self {
        Self {
            mounts: SpinLock::new(Vec::new()),
        }
    }

    /// 全局根 tnode；尚未挂载根文件系统时返回 `NotFound`
    pub fn root(&self) -> FsResult<Arc<Tnode>> {
        self.mounts
            .lock()
            .iter()
            .find(|m| m.covered.is_none())
            .map(|m| m.superblock.root().clone())
            .ok_or(FsError::NotFound)
    }

    /// 挂载
    ///
    /// `path` 为 `/` 且尚无根时建立根；否则 `path` 必须解析到一个目录，
    /// 且该目录上没有其他挂载。返回新挂载的超级块。
    pub fn mount(
        &self,
        driver: Arc<dyn FileSystemDriver>,
        device: Option<DeviceId>,
        path: &str,
    ) -> FsResult<Arc<SuperBlock>> {
        let path = normalize_path(path);
        if !path.starts_with('/') {
            return Err(FsError::InvalidArgument);
        }

        let covered = match self.root() {
            Ok(root) => {
                let target = resolve(&root, &root, &path)?;
                if !target.inode().is_dir() {
                    return Err(FsError::NotDirectory);
                }
                Some(target)
            }
            Err(_) if path == "/" => None,
            Err(e) => return Err(e),
        };

        let sb = driver.mount(device)?;
        let entries = sb.root().populate()?;

        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|m| m.path == path) {
            return Err(FsError::Busy);
        }
        if let Some(target) = &covered {
            if target.mounted().is_some() {
                return Err(FsError::Busy);
            }
            sb.set_mountpoint(Arc::downgrade(target));
            target.set_mounted(Some(sb.clone()));
        } else if mounts.iter().any(|m| m.covered.is_none()) {
            return Err(FsError::Busy);
        }
        mounts.push(MountPoint {
            path: path.clone(),
            superblock: sb.clone(),
            covered,
        });
        drop(mounts);

        log::info!(
            "vfs: mounted {} at {} ({} entries)",
            sb.fs_name(),
            path,
            entries
        );
        Ok(sb)
    }

    /// 卸载
    ///
    /// 根文件系统只能在没有其他挂载时卸载；有文件系统挂在被卸载者内部时返回 `Busy`。
    pub fn umount(&self, path: &str) -> FsResult<Arc<SuperBlock>> {
        let path = normalize_path(path);
        let mut mounts = self.mounts.lock();
        let idx = mounts
            .iter()
            .position(|m| m.path == path)
            .ok_or(FsError::NotFound)?;

        let prefix = if path == "/" {
            String::from("/")
        } else {
            path.clone() + "/"
        };
        if mounts
            .iter()
            .any(|m| m.path != path && m.path.starts_with(&prefix))
        {
            return Err(FsError::Busy);
        }

        let mp = mounts.remove(idx);
        drop(mounts);
        if let Some(covered) = &mp.covered {
            covered.set_mounted(None);
        }
        log::info!("vfs: unmounted {} from {}", mp.superblock.fs_name(), path);
        Ok(mp.superblock)
    }

    /// 当前挂载列表（路径, 文件系统名）
    pub fn list(&self) -> Vec<(String, &'static str)> {
        self.mounts
            .lock()
            .iter()
            .map(|m| (m.path.clone(), m.superblock.fs_name()))
            .collect()
    }

    /// 从根解析绝对路径
    pub fn lookup(&self, path: &str) -> FsResult<Arc<Tnode>> {
        let root = self.root()?;
        resolve(&root, &root, path)
    }

    /// 以 `cwd` 为当前目录解析路径
    pub fn lookup_from(&self, cwd: &Arc<Tnode>, path: &str) -> FsResult<Arc<Tnode>> {
        let root = self.root()?;
        resolve(&root, cwd, path)
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}
