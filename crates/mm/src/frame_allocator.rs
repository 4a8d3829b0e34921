//! 帧分配器模块
//!
//! 本模块提供物理内存帧的分配和跟踪功能。
//!
//! ## 分配策略（位图）
//!
//! - **used**：每个 bit 表示一个物理帧是否已被占用
//! - **reserved**：保留帧同时置位 used，但永远不会被分配或释放
//! - **last_alloc_hint**：上次分配所在的字，利用局部性加速查找
//!
//! 释放时直接清除对应 bit，O(1) 操作。
//!
//! ## RAII：自动回收
//!
//! - [`FrameTracker`]：单帧，`Drop` 时归还
//! - [`FrameRangeTracker`]：连续帧范围，`Drop` 时归还
//!
//! 全局接口分配出的帧在交付前清零。
//! [`FrameAllocator`] 本身只操作位图，不触碰帧内容，可以独立实例化测试。

use alloc::vec::Vec;
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::address::{PAGE_SIZE, Paddr, PageNum, Ppn, PpnRange};

/// 物理帧跟踪器，drop 时自动回收。
#[derive(Debug)]
pub struct FrameTracker(Ppn);

impl FrameTracker {
    /// 获取所管理的物理页号
    pub fn ppn(&self) -> Ppn {
        self.0
    }

    /// 帧的起始物理地址
    pub fn paddr(&self) -> Paddr {
        self.0.start_addr()
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        FRAME_ALLOCATOR.lock().dealloc(self.0);
    }
}

/// 连续物理帧范围跟踪器，drop 时自动回收。
#[derive(Debug)]
pub struct FrameRangeTracker {
    range: PpnRange,
}

impl FrameRangeTracker {
    /// 起始物理页号
    pub fn start_ppn(&self) -> Ppn {
        self.range.start()
    }

    /// 结束物理页号（不包含）
    pub fn end_ppn(&self) -> Ppn {
        self.range.end()
    }

    /// 帧数量
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// 是否为空范围
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// 页号范围
    pub fn range(&self) -> &PpnRange {
        &self.range
    }
}

impl Drop for FrameRangeTracker {
    fn drop(&mut self) {
        FRAME_ALLOCATOR.lock().dealloc_range(self.range);
    }
}

/// 将指定的物理页帧清零。
fn clear_frame(ppn: Ppn) {
    // SAFETY: 帧刚被分配，调用者独占
    unsafe {
        core::ptr::write_bytes(ppn.start_addr().as_kernel_ptr::<u8>(), 0, PAGE_SIZE);
    }
}

lazy_static! {
    /// 全局物理帧分配器，由自旋锁保护。
    static ref FRAME_ALLOCATOR: SpinLock<FrameAllocator> = SpinLock::new(FrameAllocator::new());
}

/// 位图物理帧分配器
pub struct FrameAllocator {
    start: Ppn,
    end: Ppn,
    used: Vec<u64>,
    reserved: Vec<u64>,
    total_frames: usize,
    /// 已占用帧数，包含保留帧
    allocated_count: usize,
    reserved_count: usize,
    last_alloc_hint: usize,
}

#[inline]
fn bit(bitmap: &[u64], idx: usize) -> bool {
    bitmap[idx / 64] & (1u64 << (idx % 64)) != 0
}

#[inline]
fn set_bit(bitmap: &mut [u64], idx: usize, value: bool) {
    if value {
        bitmap[idx / 64] |= 1u64 << (idx % 64);
    } else {
        bitmap[idx / 64] &= !(1u64 << (idx % 64));
    }
}

impl FrameAllocator {
    /// 创建一个空的帧分配器，需要 [`init`](Self::init) 后才能分配。
    pub const fn new() -> Self {
        FrameAllocator {
            start: Ppn(0),
            end: Ppn(0),
            used: Vec::new(),
            reserved: Vec::new(),
            total_frames: 0,
            allocated_count: 0,
            reserved_count: 0,
            last_alloc_hint: 0,
        }
    }

    /// 设置管理的物理页范围 `[start, end)`，全部标记为空闲。
    pub fn init(&mut self, start: Ppn, end: Ppn) {
        self.start = start;
        self.end = end;
        self.total_frames = end.as_usize().saturating_sub(start.as_usize());
        let words = self.total_frames.div_ceil(64);
        self.used = alloc::vec![0u64; words];
        self.reserved = alloc::vec![0u64; words];
        self.allocated_count = 0;
        self.reserved_count = 0;
        self.last_alloc_hint = 0;
    }

    fn index_of(&self, ppn: Ppn) -> usize {
        ppn.as_usize() - self.start.as_usize()
    }

    /// 把一段帧标记为保留：不会被分配，也不会被释放。
    ///
    /// 范围外的部分被忽略；已分配的帧保持原样，返回实际新保留的帧数。
    pub fn reserve(&mut self, range: PpnRange) -> usize {
        let lo = range.start().max(self.start);
        let hi = range.end().min(self.end);
        let mut count = 0;
        let mut ppn = lo;
        while ppn < hi {
            let idx = self.index_of(ppn);
            if !bit(&self.used, idx) {
                set_bit(&mut self.used, idx, true);
                set_bit(&mut self.reserved, idx, true);
                count += 1;
            }
            ppn = ppn + 1;
        }
        self.allocated_count += count;
        self.reserved_count += count;
        count
    }

    /// 帧是否处于保留状态
    pub fn is_reserved(&self, ppn: Ppn) -> bool {
        ppn >= self.start && ppn < self.end && bit(&self.reserved, self.index_of(ppn))
    }

    /// 分配一个物理帧，从 last_alloc_hint 开始循环查找。
    pub fn alloc(&mut self) -> Option<Ppn> {
        let words = self.used.len();
        for offset in 0..words {
            let word_idx = (self.last_alloc_hint + offset) % words;
            let word = self.used[word_idx];
            if word == u64::MAX {
                continue;
            }
            let frame_idx = word_idx * 64 + (!word).trailing_zeros() as usize;
            if frame_idx >= self.total_frames {
                continue;
            }
            set_bit(&mut self.used, frame_idx, true);
            self.allocated_count += 1;
            self.last_alloc_hint = word_idx;
            return Some(self.start + frame_idx);
        }
        None
    }

    /// 分配 `num` 个连续帧，起始帧号按 `align_pages` 对齐（必须是 2 的幂）。
    pub fn alloc_contig(&mut self, num: usize, align_pages: usize) -> Option<PpnRange> {
        debug_assert!(align_pages.is_power_of_two(), "alignment must be power of 2");
        if num == 0 || num > self.free_frames() {
            return None;
        }

        let mut idx = 0;
        while idx + num <= self.total_frames {
            let aligned = (self.start.as_usize() + idx).next_multiple_of(align_pages)
                - self.start.as_usize();
            if aligned + num > self.total_frames {
                break;
            }
            match (aligned..aligned + num).find(|&i| bit(&self.used, i)) {
                Some(busy) => idx = busy + 1,
                None => {
                    for i in aligned..aligned + num {
                        set_bit(&mut self.used, i, true);
                    }
                    self.allocated_count += num;
                    return Some(PpnRange::from_start_len(self.start + aligned, num));
                }
            }
        }
        None
    }

    /// 回收一个物理帧。
    ///
    /// 保留帧的回收被忽略；越界和重复释放是调试断言。
    pub fn dealloc(&mut self, ppn: Ppn) {
        debug_assert!(
            ppn >= self.start && ppn < self.end,
            "dealloc: frame {:?} out of range",
            ppn
        );
        let idx = self.index_of(ppn);
        if bit(&self.reserved, idx) {
            return;
        }
        debug_assert!(bit(&self.used, idx), "dealloc: double free of {:?}", ppn);
        set_bit(&mut self.used, idx, false);
        self.allocated_count -= 1;
    }

    /// 回收一个连续的物理帧范围。
    pub fn dealloc_range(&mut self, range: PpnRange) {
        for ppn in range {
            self.dealloc(ppn);
        }
    }

    /// 总帧数
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 已占用帧数（包含保留帧）
    pub fn allocated_frames(&self) -> usize {
        self.allocated_count
    }

    /// 保留帧数
    pub fn reserved_frames(&self) -> usize {
        self.reserved_count
    }

    /// 空闲帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames - self.allocated_count
    }

    /// (总帧数, 已占用, 空闲)
    pub fn get_stats(&self) -> (usize, usize, usize) {
        (self.total_frames, self.allocated_count, self.free_frames())
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// 使用可用的物理内存范围 `[start_addr, end_addr)` 初始化全局帧分配器。
pub fn init_frame_allocator(start_addr: usize, end_addr: usize) {
    let start = Ppn::from_addr_ceil(Paddr::from_usize(start_addr));
    let end = Ppn::from_addr_floor(Paddr::from_usize(end_addr));
    let mut allocator = FRAME_ALLOCATOR.lock();
    allocator.init(start, end);
    log::info!(
        "frame allocator: {} frames from {:?}",
        allocator.total_frames(),
        start
    );
}

/// 在全局分配器中保留一段物理地址（例如内核镜像或设备内存）
pub fn reserve_frames(start_addr: usize, end_addr: usize) -> usize {
    let range = PpnRange::new(
        Ppn::from_addr_floor(Paddr::from_usize(start_addr)),
        Ppn::from_addr_ceil(Paddr::from_usize(end_addr)),
    );
    FRAME_ALLOCATOR.lock().reserve(range)
}

/// 分配一个清零的物理帧。
pub fn alloc_frame() -> Option<FrameTracker> {
    let ppn = FRAME_ALLOCATOR.lock().alloc()?;
    clear_frame(ppn);
    Some(FrameTracker(ppn))
}

/// 分配多个物理帧（不保证连续），要么全部成功要么全部归还。
pub fn alloc_frames(num: usize) -> Option<Vec<FrameTracker>> {
    let mut frames = Vec::with_capacity(num);
    for _ in 0..num {
        // 失败时已分配的帧随 frames 一起 drop
        frames.push(alloc_frame()?);
    }
    Some(frames)
}

/// 分配指定数量的连续物理帧。
pub fn alloc_contig_frames(num: usize) -> Option<FrameRangeTracker> {
    alloc_contig_frames_aligned(num, 1)
}

/// 分配指定数量的连续物理帧，起始地址按 `align_pages` 页对齐。
pub fn alloc_contig_frames_aligned(num: usize, align_pages: usize) -> Option<FrameRangeTracker> {
    let range = FRAME_ALLOCATOR.lock().alloc_contig(num, align_pages)?;
    for ppn in range {
        clear_frame(ppn);
    }
    Some(FrameRangeTracker { range })
}

/// 获取总的物理帧数
pub fn get_total_frames() -> usize {
    FRAME_ALLOCATOR.lock().total_frames()
}

/// 获取已分配的帧数
pub fn get_allocated_frames() -> usize {
    FRAME_ALLOCATOR.lock().allocated_frames()
}

/// 获取空闲的帧数
pub fn get_free_frames() -> usize {
    FRAME_ALLOCATOR.lock().free_frames()
}

/// 获取帧分配器的当前状态：(总帧数, 已占用, 空闲)
pub fn get_stats() -> (usize, usize, usize) {
    FRAME_ALLOCATOR.lock().get_stats()
}
