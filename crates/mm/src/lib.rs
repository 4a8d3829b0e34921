//! 内存管理子系统
//!
//! 提供地址抽象、物理帧分配、页表、内存对象、虚拟内存区域列表和地址空间。
//!
//! # 数据流
//!
//! 帧分配器向内存对象和页表提供物理帧；内存对象被一个或多个区域共享；
//! 地址空间把区域列表和页表组合在一起，每个进程恰好一个。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与架构特定组件解耦：
//! - [`ArchMmOps`]: 物理地址与内核虚拟地址互转、本地 TLB 失效
//! - [`MmConfig`]: 用户栈大小、用户空间上界
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现。

#![no_std]

extern crate alloc;

mod arch_ops;
mod config;
mod error;
mod file;

pub mod address;
pub mod address_space;
pub mod frame_allocator;
pub mod memory_object;
pub mod page_table;
pub mod region;

pub use arch_ops::{ArchMmOps, arch_ops, register_arch_ops};
pub use config::{MmConfig, mm_config, register_config};
pub use error::{MmError, MmResult};
pub use file::MmFile;

pub use address::{PAGE_SIZE, PageNum, Paddr, Ppn, PpnRange, Vaddr, Vpn, VpnRange};
pub use address_space::AddressSpace;
pub use frame_allocator::{
    FrameRangeTracker, FrameTracker, alloc_contig_frames, alloc_contig_frames_aligned,
    alloc_frame, alloc_frames, init_frame_allocator,
};
pub use memory_object::{MemoryObject, ObjectKind};
pub use page_table::{PageTable, UniversalPTEFlag};
pub use region::{RegionList, RegionType, VmFlags, VmRegion};
