//! 设备注册表与 devfs
//!
//! 设备以 `{ 设备号, 模式, 文件操作 }` 的形式注册。devfs 的根目录实时反映注册表：
//! 注册后设备节点出现在每个已挂载的 devfs 根下，注销后消失。
//! 打开设备节点得到的文件使用设备自己的文件操作。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use sync::SpinLock;

use crate::dev::{DeviceId, major, minor};
use crate::superblock::ROOT_INODE_INDEX;
use crate::{
    DirEntry, FileMode, FileOps, FileSystemDriver, FsError, FsResult, Inode, InodeKind, InodeOps,
    SuperBlock, Tnode,
};

/// 一个已注册的设备
pub struct Device {
    /// 设备节点名（出现在 devfs 根下）
    pub name: String,
    /// 设备号
    pub number: DeviceId,
    /// 类型与权限位，类型必须是字符设备或块设备
    pub mode: FileMode,
    /// 打开设备后使用的文件操作
    pub ops: Arc<dyn FileOps>,
}

impl Device {
    fn kind(&self) -> Option<InodeKind> {
        match self.mode & FileMode::S_IFMT {
            m if m == FileMode::S_IFCHR => Some(InodeKind::CharDevice),
            m if m == FileMode::S_IFBLK => Some(InodeKind::BlockDevice),
            _ => None,
        }
    }
}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("major", &major(self.number))
            .field("minor", &minor(self.number))
            .finish()
    }
}

struct Registry {
    devices: BTreeMap<DeviceId, Arc<Device>>,
    mounts: Vec<Weak<SuperBlock>>,
}

impl Registry {
    fn by_name(&self, name: &str) -> Option<&Arc<Device>> {
        self.devices.values().find(|dev| dev.name == name)
    }
}

/// devfs 驱动，同时也是设备注册表
pub struct DevFs {
    registry: Arc<SpinLock<Registry>>,
}

impl DevFs {
    /// 创建空的注册表
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(SpinLock::new(Registry {
                devices: BTreeMap::new(),
                mounts: Vec::new(),
            })),
        })
    }

    /// 注册设备
    ///
    /// 设备号或节点名重复时返回 `AlreadyExists`；模式不是设备类型时返回 `InvalidArgument`。
    pub fn register(&self, device: Device) -> FsResult<()> {
        let kind = device.kind().ok_or(FsError::InvalidArgument)?;
        let mut reg = self.registry.lock();
        if reg.devices.contains_key(&device.number) || reg.by_name(&device.name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let device = Arc::new(device);
        reg.devices.insert(device.number, device.clone());

        reg.mounts.retain(|sb| sb.strong_count() > 0);
        for sb in reg.mounts.iter().filter_map(Weak::upgrade) {
            let root = sb.root();
            let inode = device_inode(&sb, kind, &device);
            if let Err(e) = root.add_child(Tnode::new(&device.name, inode, root)) {
                log::warn!("devfs: {} not linked under mount: {:?}", device.name, e);
            }
        }
        log::info!(
            "devfs: registered {} ({}:{})",
            device.name,
            major(device.number),
            minor(device.number)
        );
        Ok(())
    }

    /// 注销设备，设备号不存在时返回 `NotFound`
    pub fn unregister(&self, number: DeviceId) -> FsResult<Arc<Device>> {
        let mut reg = self.registry.lock();
        let device = reg.devices.remove(&number).ok_or(FsError::NotFound)?;
        for sb in reg.mounts.iter().filter_map(Weak::upgrade) {
            sb.root().remove_child(&device.name);
        }
        log::info!("devfs: unregistered {}", device.name);
        Ok(device)
    }

    /// 按设备号查找
    pub fn get(&self, number: DeviceId) -> Option<Arc<Device>> {
        self.registry.lock().devices.get(&number).cloned()
    }

    /// 已注册设备个数
    pub fn len(&self) -> usize {
        self.registry.lock().devices.len()
    }

    /// 是否没有注册任何设备
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn device_inode(sb: &Arc<SuperBlock>, kind: InodeKind, device: &Arc<Device>) -> Arc<Inode> {
    Arc::new(
        Inode::new(
            sb.alloc_index(),
            kind,
            device.mode,
            Arc::downgrade(sb),
            Arc::new(DeviceNodeOps {
                device: device.clone(),
            }),
        )
        .with_device(device.number),
    )
}

/// devfs 根目录的操作
struct DevRootOps {
    registry: Arc<SpinLock<Registry>>,
}

impl InodeOps for DevRootOps {
    fn lookup(&self, dir: &Arc<Tnode>, name: &str) -> Option<Arc<Tnode>> {
        let device = self.registry.lock().by_name(name).cloned()?;
        let sb = dir.inode().superblock()?;
        let inode = device_inode(&sb, device.kind()?, &device);
        Some(Tnode::new(name, inode, dir))
    }

    fn readdir(&self, _dir: &Inode) -> FsResult<Vec<DirEntry>> {
        let reg = self.registry.lock();
        Ok(reg
            .devices
            .values()
            .filter_map(|dev| {
                Some(DirEntry {
                    name: dev.name.clone(),
                    index: 0,
                    kind: dev.kind()?,
                    size: 0,
                })
            })
            .collect())
    }
}

/// 设备节点的操作
struct DeviceNodeOps {
    device: Arc<Device>,
}

impl InodeOps for DeviceNodeOps {
    fn lookup(&self, _dir: &Arc<Tnode>, _name: &str) -> Option<Arc<Tnode>> {
        None
    }

    fn readdir(&self, _dir: &Inode) -> FsResult<Vec<DirEntry>> {
        Err(FsError::NotDirectory)
    }

    fn file_ops(&self, _inode: &Arc<Inode>) -> Option<Arc<dyn FileOps>> {
        Some(self.device.ops.clone())
    }
}

impl FileSystemDriver for DevFs {
    fn fs_name(&self) -> &'static str {
        "devfs"
    }

    fn mount(self: Arc<Self>, device: Option<DeviceId>) -> FsResult<Arc<SuperBlock>> {
        let registry = self.registry.clone();
        let sb = SuperBlock::new(self, device, |weak| {
            Inode::new(
                ROOT_INODE_INDEX,
                InodeKind::Directory,
                FileMode::with_kind(InodeKind::Directory, 0o755),
                weak.clone(),
                Arc::new(DevRootOps {
                    registry: registry.clone(),
                }),
            )
        });
        registry.lock().mounts.push(Arc::downgrade(&sb));
        Ok(sb)
    }
}
