//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `mm` crate（避免循环依赖）。
//! `mm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `ArchMmOps` / `MmConfig`）。
//!
//! “物理内存”由一段页对齐的静态数组承担：物理地址 `p` 对应数组内偏移 `p`，
//! 因此清零帧、页表遍历和用户字读写都作用在真实内存上。

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 模拟物理内存大小（16 MiB）
pub const ARENA_SIZE: usize = 16 * 1024 * 1024;

const PAGE_SIZE: usize = 4096;

#[repr(C, align(4096))]
struct Arena(UnsafeCell<[u8; ARENA_SIZE]>);

// SAFETY: 只通过原始指针访问，互斥由帧分配器保证
unsafe impl Sync for Arena {}

static ARENA: Arena = Arena(UnsafeCell::new([0; ARENA_SIZE]));

/// Mock 的内存管理架构操作
pub struct MockMmOps {
    tlb_flushes: AtomicUsize,
}

impl MockMmOps {
    pub const fn new() -> Self {
        Self {
            tlb_flushes: AtomicUsize::new(0),
        }
    }

    /// 可交给帧分配器管理的物理地址范围 `[start, end)`
    ///
    /// 第 0 页保留不用，避免物理地址 0 出现在测试中。
    pub fn phys_range(&self) -> (usize, usize) {
        (PAGE_SIZE, ARENA_SIZE)
    }

    /// 将物理地址转换为虚拟地址（数组基址 + 偏移）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        debug_assert!(paddr < ARENA_SIZE, "paddr {:#x} outside mock arena", paddr);
        ARENA.0.get() as usize + paddr
    }

    /// 将虚拟地址转换回物理地址
    pub fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        vaddr - ARENA.0.get() as usize
    }

    /// 本地 TLB 失效（记录次数）
    pub fn flush_tlb_local(&self, _vaddr: usize) {
        self.tlb_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// 迄今记录的 TLB 失效次数
    pub fn tlb_flushes(&self) -> usize {
        self.tlb_flushes.load(Ordering::Relaxed)
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_OPS: MockMmOps = MockMmOps::new();

/// Mock 的内存管理配置
pub struct MockMmConfig;

impl MockMmConfig {
    pub const fn new() -> Self {
        Self
    }

    /// 用户栈大小（2 MiB）
    pub fn user_stack_size(&self) -> usize {
        2 * 1024 * 1024
    }

    /// 用户空间上界，也是内核保留区的起点
    pub fn user_space_end(&self) -> usize {
        0x40_0000_0000
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_CONFIG: MockMmConfig = MockMmConfig::new();
