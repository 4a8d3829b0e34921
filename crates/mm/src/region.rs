//! 虚拟内存区域列表
//!
//! 每个地址空间维护一个按起始地址升序排列、互不重叠的区域列表。
//! 大部分操作以区域类型标签为键，作用于该类型的第一个区域。
//!
//! [`RegionList::add`] 不检查重叠，调用者（通常是
//! [`AddressSpace`](crate::AddressSpace)）负责预先验证位置；
//! 其余伸缩操作自行检查相邻区域。

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::address::{PageNum, Vaddr, Vpn, VpnRange};
use crate::error::{MmError, MmResult};
use crate::memory_object::MemoryObject;
use crate::page_table::UniversalPTEFlag;

bitflags! {
    /// 区域属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmFlags: u32 {
        /// 可写
        const WRITABLE = 1 << 0;
        /// 用户态可访问
        const USER = 1 << 1;
        /// 与其它地址空间共享后备对象
        const SHARED = 1 << 2;
        /// 不可执行
        const NO_EXEC = 1 << 3;
        /// 保护页：永不映射，访问即致命异常
        const GUARD = 1 << 4;
        /// 栈
        const STACK = 1 << 5;
        /// 内核保留
        const KERNEL = 1 << 6;
    }
}

impl VmFlags {
    /// 对应的页表项标志
    pub fn pte_flags(self) -> UniversalPTEFlag {
        let mut flags = UniversalPTEFlag::VALID | UniversalPTEFlag::READABLE;
        if self.contains(VmFlags::WRITABLE) {
            flags |= UniversalPTEFlag::WRITEABLE;
        }
        if !self.contains(VmFlags::NO_EXEC) {
            flags |= UniversalPTEFlag::EXECUTABLE;
        }
        if self.contains(VmFlags::USER) {
            flags |= UniversalPTEFlag::USER_ACCESSIBLE;
        }
        if self.contains(VmFlags::KERNEL) {
            flags |= UniversalPTEFlag::GLOBAL;
        }
        flags
    }
}

/// 区域类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType {
    /// 内核代码
    KernelText,
    /// 内核数据
    KernelData,
    /// 内核堆
    KernelHeap,
    /// 其它内核保留区
    KernelReserved,
    /// 用户代码
    UserText,
    /// 用户数据
    UserData,
    /// 用户堆
    UserHeap,
    /// 用户栈
    UserStack,
    /// 用户栈上方的保护页
    UserGuard,
    /// 匿名或文件映射
    UserMmap,
    /// 共享内存
    UserShared,
}

/// 一段属性一致的连续虚拟地址区间
#[derive(Debug, Clone)]
pub struct VmRegion {
    range: VpnRange,
    flags: VmFlags,
    kind: RegionType,
    object: Option<Arc<MemoryObject>>,
    /// 区域首页在后备对象中的页索引
    offset: usize,
}

impl VmRegion {
    /// 创建没有后备对象的区域
    pub fn new(range: VpnRange, flags: VmFlags, kind: RegionType) -> Self {
        Self {
            range,
            flags,
            kind,
            object: None,
            offset: 0,
        }
    }

    /// 由字节地址创建区域，`start` 和 `end` 必须页对齐
    pub fn from_addrs(start: usize, end: usize, flags: VmFlags, kind: RegionType) -> MmResult<Self> {
        let (start, end) = (Vaddr::from_usize(start), Vaddr::from_usize(end));
        if !start.is_page_aligned() || !end.is_page_aligned() || start >= end {
            return Err(MmError::InvalidAddress);
        }
        Ok(Self::new(
            VpnRange::new(Vpn::from_addr_floor(start), Vpn::from_addr_floor(end)),
            flags,
            kind,
        ))
    }

    /// 附加后备对象，`offset` 为区域首页在对象中的页索引
    pub fn with_object(mut self, object: Arc<MemoryObject>, offset: usize) -> Self {
        self.object = Some(object);
        self.offset = offset;
        self
    }

    /// 页号区间
    pub fn range(&self) -> VpnRange {
        self.range
    }

    /// 起始地址
    pub fn start(&self) -> Vaddr {
        self.range.start().start_addr()
    }

    /// 结束地址（不包含）
    pub fn end(&self) -> Vaddr {
        self.range.end().start_addr()
    }

    /// 页数
    pub fn pages(&self) -> usize {
        self.range.len()
    }

    /// 属性
    pub fn flags(&self) -> VmFlags {
        self.flags
    }

    /// 类型标签
    pub fn kind(&self) -> RegionType {
        self.kind
    }

    /// 后备对象
    pub fn object(&self) -> Option<&Arc<MemoryObject>> {
        self.object.as_ref()
    }

    /// 区域首页在后备对象中的页索引
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// `vpn` 在后备对象中的页索引
    pub fn object_index(&self, vpn: Vpn) -> usize {
        self.offset + (vpn.as_usize() - self.range.start().as_usize())
    }

    /// 是否包含地址
    pub fn contains(&self, vaddr: Vaddr) -> bool {
        self.range.contains(Vpn::from_addr_floor(vaddr))
    }
}

/// 有序区域列表
#[derive(Debug, Default)]
pub struct RegionList {
    regions: Vec<VmRegion>,
}

impl RegionList {
    /// 空列表
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// 区域数量
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// 按起始地址升序遍历
    pub fn iter(&self) -> impl Iterator<Item = &VmRegion> {
        self.regions.iter()
    }

    /// 插入区域，保持起始地址升序；不检查重叠
    pub fn add(&mut self, region: VmRegion) {
        let pos = self
            .regions
            .iter()
            .position(|r| r.range.start() > region.range.start())
            .unwrap_or(self.regions.len());
        self.regions.insert(pos, region);
    }

    fn position(&self, kind: RegionType) -> MmResult<usize> {
        self.regions
            .iter()
            .position(|r| r.kind == kind)
            .ok_or(MmError::NotFound)
    }

    /// 移除第一个该类型的区域
    pub fn remove(&mut self, kind: RegionType) -> MmResult<VmRegion> {
        let idx = self.position(kind)?;
        Ok(self.regions.remove(idx))
    }

    /// 第一个该类型的区域
    pub fn get(&self, kind: RegionType) -> Option<&VmRegion> {
        self.regions.iter().find(|r| r.kind == kind)
    }

    /// 最后一个该类型的区域
    pub fn get_last(&self, kind: RegionType) -> Option<&VmRegion> {
        self.regions.iter().rev().find(|r| r.kind == kind)
    }

    /// 包含 `vaddr` 的区域
    pub fn find(&self, vaddr: Vaddr) -> Option<&VmRegion> {
        let vpn = Vpn::from_addr_floor(vaddr);
        // 列表有序：最后一个起点不大于 vpn 的区域是唯一候选
        let idx = self.regions.partition_point(|r| r.range.start() <= vpn);
        let candidate = self.regions.get(idx.checked_sub(1)?)?;
        candidate.range.contains(vpn).then_some(candidate)
    }

    /// `range` 是否与所有区域都不重叠
    pub fn is_free(&self, range: VpnRange) -> bool {
        !range.is_empty() && self.regions.iter().all(|r| !r.range.overlaps(&range))
    }

    /// 在 `[lower, upper)` 内自低向高寻找第一段 `pages` 页的空闲区间
    pub fn first_fit(&self, lower: Vpn, upper: Vpn, pages: usize) -> Option<VpnRange> {
        if pages == 0 {
            return None;
        }
        let mut cursor = lower;
        for r in self.regions.iter() {
            if r.range.end() <= cursor {
                continue;
            }
            if r.range.start() >= cursor && r.range.start().as_usize() - cursor.as_usize() >= pages
            {
                break;
            }
            cursor = cursor.max(r.range.end());
        }
        let end = cursor.as_usize().checked_add(pages)?;
        (end <= upper.as_usize()).then(|| VpnRange::from_start_len(cursor, pages))
    }

    /// 把该类型第一个区域的结束页后移 `n` 页
    ///
    /// 新的结束页可以恰好等于下一个区域的起始页，超过则返回 `WouldOverlap`。
    pub fn extend_end(&mut self, kind: RegionType, n: usize) -> MmResult<()> {
        let idx = self.position(kind)?;
        let new_end = self.regions[idx]
            .range
            .end()
            .as_usize()
            .checked_add(n)
            .ok_or(MmError::WouldOverlap)?;
        if let Some(next) = self.regions.get(idx + 1)
            && new_end > next.range.start().as_usize()
        {
            return Err(MmError::WouldOverlap);
        }
        self.regions[idx].range.end = Vpn::from_usize(new_end);
        debug_assert!(self.is_well_formed());
        Ok(())
    }

    /// 把该类型第一个区域的起始页前移 `n` 页
    ///
    /// 不能低于上一个区域的结束页（可以相等），不能越过地址 0，
    /// 有后备对象时也不能越过对象的第 0 页。
    pub fn extend_start(&mut self, kind: RegionType, n: usize) -> MmResult<()> {
        let idx = self.position(kind)?;
        let region = &self.regions[idx];
        let new_start = region
            .range
            .start()
            .as_usize()
            .checked_sub(n)
            .ok_or(MmError::WouldUnderflow)?;
        if region.object.is_some() && region.offset < n {
            return Err(MmError::WouldUnderflow);
        }
        if idx > 0 && new_start < self.regions[idx - 1].range.end().as_usize() {
            return Err(MmError::WouldOverlap);
        }
        let region = &mut self.regions[idx];
        region.range.start = Vpn::from_usize(new_start);
        if region.object.is_some() {
            region.offset -= n;
        }
        debug_assert!(self.is_well_formed());
        Ok(())
    }

    /// 把该类型第一个区域的结束页前移 `n` 页；区域不能因此变空
    pub fn contract_end(&mut self, kind: RegionType, n: usize) -> MmResult<()> {
        let idx = self.position(kind)?;
        let region = &mut self.regions[idx];
        if n >= region.range.len() {
            return Err(MmError::WouldUnderflow);
        }
        region.range.end = region.range.end() - n;
        Ok(())
    }

    /// 把该类型第一个区域的起始页后移 `n` 页；区域不能因此变空
    pub fn contract_start(&mut self, kind: RegionType, n: usize) -> MmResult<()> {
        let idx = self.position(kind)?;
        let region = &mut self.regions[idx];
        if n >= region.range.len() {
            return Err(MmError::WouldUnderflow);
        }
        region.range.start = region.range.start() + n;
        if region.object.is_some() {
            region.offset += n;
        }
        Ok(())
    }

    /// 取出全部区域
    pub fn take_all(&mut self) -> Vec<VmRegion> {
        core::mem::take(&mut self.regions)
    }

    /// 列表是否升序、互不重叠且没有空区域
    pub fn is_well_formed(&self) -> bool {
        self.regions.iter().all(|r| !r.range.is_empty())
            && self
                .regions
                .windows(2)
                .all(|w| w[0].range.end() <= w[1].range.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: usize, end: usize, kind: RegionType) -> VmRegion {
        VmRegion::from_addrs(start, end, VmFlags::USER | VmFlags::WRITABLE, kind).unwrap()
    }

    fn two_regions() -> RegionList {
        let mut list = RegionList::new();
        list.add(region(0x3000, 0x4000, RegionType::UserHeap));
        list.add(region(0x1000, 0x2000, RegionType::UserData));
        list
    }

    #[test]
    fn test_add_keeps_order() {
        let list = two_regions();
        let kinds: Vec<_> = list.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, [RegionType::UserData, RegionType::UserHeap]);
        assert!(list.is_well_formed());
    }

    #[test]
    fn test_extend_end_to_exact_neighbor_then_overlap() {
        let mut list = two_regions();
        list.extend_end(RegionType::UserData, 1).unwrap();
        let a = list.get(RegionType::UserData).unwrap();
        assert_eq!((a.start().as_usize(), a.end().as_usize()), (0x1000, 0x3000));

        assert_eq!(list.extend_end(RegionType::UserData, 1), Err(MmError::WouldOverlap));
        let a = list.get(RegionType::UserData).unwrap();
        assert_eq!(a.end().as_usize(), 0x3000);
        assert!(list.is_well_formed());
    }

    #[test]
    fn test_missing_type_is_not_found() {
        let mut list = two_regions();
        assert_eq!(list.extend_end(RegionType::UserStack, 1), Err(MmError::NotFound));
        assert_eq!(list.contract_start(RegionType::UserStack, 1), Err(MmError::NotFound));
        assert!(list.remove(RegionType::UserStack).is_err());
    }

    #[test]
    fn test_extend_start_bounds() {
        let mut list = two_regions();
        list.extend_start(RegionType::UserHeap, 1).unwrap();
        assert_eq!(list.extend_start(RegionType::UserHeap, 1), Err(MmError::WouldOverlap));
        list.extend_start(RegionType::UserData, 1).unwrap();
        assert_eq!(list.extend_start(RegionType::UserData, 1), Err(MmError::WouldUnderflow));
    }

    #[test]
    fn test_contract_cannot_empty_region() {
        let mut list = RegionList::new();
        list.add(region(0x1000, 0x4000, RegionType::UserMmap));
        list.contract_end(RegionType::UserMmap, 1).unwrap();
        list.contract_start(RegionType::UserMmap, 1).unwrap();
        assert_eq!(list.contract_end(RegionType::UserMmap, 1), Err(MmError::WouldUnderflow));
        assert_eq!(list.contract_start(RegionType::UserMmap, 2), Err(MmError::WouldUnderflow));
        let r = list.get(RegionType::UserMmap).unwrap();
        assert_eq!((r.start().as_usize(), r.end().as_usize()), (0x2000, 0x3000));
    }

    #[test]
    fn test_extend_start_respects_object_offset() {
        let mut list = RegionList::new();
        let obj = MemoryObject::anonymous();
        list.add(region(0x10000, 0x12000, RegionType::UserStack).with_object(obj, 1));
        list.extend_start(RegionType::UserStack, 1).unwrap();
        assert_eq!(list.get(RegionType::UserStack).unwrap().offset(), 0);
        assert_eq!(list.extend_start(RegionType::UserStack, 1), Err(MmError::WouldUnderflow));
    }

    #[test]
    fn test_find_and_first_fit() {
        let list = two_regions();
        assert_eq!(list.find(Vaddr::from_usize(0x1800)).unwrap().kind(), RegionType::UserData);
        assert!(list.find(Vaddr::from_usize(0x2000)).is_none());
        assert!(list.find(Vaddr::from_usize(0x0)).is_none());

        assert_eq!(
            list.first_fit(Vpn(1), Vpn(0x10), 1),
            Some(VpnRange::new(Vpn(2), Vpn(3)))
        );
        assert_eq!(
            list.first_fit(Vpn(1), Vpn(0x10), 2),
            Some(VpnRange::new(Vpn(4), Vpn(6)))
        );
        assert_eq!(list.first_fit(Vpn(1), Vpn(5), 2), None);
        assert!(list.is_free(VpnRange::new(Vpn(2), Vpn(3))));
        assert!(!list.is_free(VpnRange::new(Vpn(2), Vpn(4))));
    }

    #[test]
    fn test_random_sequences_stay_well_formed() {
        // 固定种子的线性同余序列，覆盖各操作的交错
        let kinds = [
            RegionType::UserText,
            RegionType::UserData,
            RegionType::UserHeap,
            RegionType::UserMmap,
        ];
        let mut list = RegionList::new();
        for (i, kind) in kinds.iter().enumerate() {
            let base = 0x10_000 * (i + 1);
            list.add(region(base, base + 0x2000, *kind));
        }

        let mut seed: u64 = 0x2545_f491;
        for _ in 0..2000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let kind = kinds[(seed >> 33) as usize % kinds.len()];
            let n = ((seed >> 40) % 20) as usize;
            let _ = match (seed >> 20) % 4 {
                0 => list.extend_end(kind, n),
                1 => list.extend_start(kind, n),
                2 => list.contract_end(kind, n),
                _ => list.contract_start(kind, n),
            };
            assert!(list.is_well_formed());
        }
    }
}
