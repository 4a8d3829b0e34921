//! 内核虚拟文件系统层
//!
//! 此 crate 提供统一的文件系统抽象：
//!
//! - [`Tnode`] - 文件系统树中的具名节点
//! - [`Inode`] / [`InodeOps`] - 索引节点及驱动提供的操作
//! - [`SuperBlock`] / [`FileSystemDriver`] - 每次挂载的元数据与驱动入口
//! - [`File`] / [`FileOps`] - 打开文件的会话与读写操作
//! - [`MountTable`] - 挂载表与路径解析入口
//! - [`FileTable`] - 进程的固定大小文件表
//! - 自带的 [`ramfs`] 与 [`devfs`] 两个驱动

#![no_std]

extern crate alloc;

pub mod dev;
pub mod devfs;
pub mod error;
pub mod ramfs;

mod file;
mod file_table;
mod inode;
mod mount;
mod path;
mod superblock;
mod tnode;

pub use dev::{DeviceId, major, makedev, minor};
pub use error::{FsError, FsResult};
pub use file::{File, FileOps};
pub use file_table::{DEFAULT_FILE_TABLE_SIZE, FileTable};
pub use inode::{DirEntry, FileMode, Inode, InodeKind, InodeOps};
pub use mount::{MountPoint, MountTable};
pub use path::{
    NAME_MAX, PathComponent, normalize_path, parse_path, resolve, resolve_parent, split_path,
};
pub use superblock::{FileSystemDriver, ROOT_INODE_INDEX, SuperBlock};
pub use tnode::Tnode;

pub use devfs::{DevFs, Device};
pub use ramfs::RamFs;

// Re-export uapi types for convenience
pub use uapi::fcntl::{OpenFlags, SeekWhence};
