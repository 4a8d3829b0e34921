//! 地址空间
//!
//! 由区域列表和页表组成，每个进程恰好一个。区域的后备页按需装入页表，
//! 用户字读写经由物理地址翻译完成。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::address::{PAGE_SIZE, PageNum, Paddr, Ppn, Vaddr, Vpn, VpnRange};
use crate::error::{MmError, MmResult};
use crate::memory_object::MemoryObject;
use crate::page_table::{PageTable, UniversalPTEFlag};
use crate::region::{RegionList, RegionType, VmFlags, VmRegion};

/// 进程地址空间
pub struct AddressSpace {
    regions: RegionList,
    page_table: PageTable,
}

impl AddressSpace {
    /// 创建空地址空间
    pub fn new() -> MmResult<Self> {
        Ok(Self {
            regions: RegionList::new(),
            page_table: PageTable::new()?,
        })
    }

    /// 区域列表
    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    /// 页表
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// 直接建立一页映射（不登记区域）
    ///
    /// 页表帧耗尽时返回 `OutOfMemory`。
    pub fn map_physical_page(
        &mut self,
        vaddr: Vaddr,
        paddr: Paddr,
        flags: UniversalPTEFlag,
    ) -> MmResult<()> {
        if !vaddr.is_page_aligned() || !paddr.is_page_aligned() {
            return Err(MmError::InvalidAddress);
        }
        self.page_table.map(
            Vpn::from_addr_floor(vaddr),
            Ppn::from_addr_floor(paddr),
            flags,
        )
    }

    /// 登记区域；与已有区域重叠时返回 `WouldOverlap`
    pub fn map_region(&mut self, region: VmRegion) -> MmResult<()> {
        let flags = region.flags();
        if flags.contains(VmFlags::KERNEL | VmFlags::USER)
            || (flags.contains(VmFlags::GUARD) && region.object().is_some())
        {
            return Err(MmError::InvalidFlags);
        }
        if region.range().is_empty() {
            return Err(MmError::InvalidAddress);
        }
        if !self.regions.is_free(region.range()) {
            return Err(MmError::WouldOverlap);
        }
        log::debug!(
            "map_region {:?} [{:#x}, {:#x})",
            region.kind(),
            region.start(),
            region.end()
        );
        self.regions.add(region);
        Ok(())
    }

    /// 移除该类型的第一个区域并拆除其已装入的页
    ///
    /// 返回被移除的区域；其后备对象引用随返回值的 drop 释放。
    pub fn unmap_region(&mut self, kind: RegionType) -> MmResult<VmRegion> {
        let region = self.regions.remove(kind)?;
        self.unmap_pages(region.range());
        Ok(region)
    }

    fn unmap_pages(&mut self, range: VpnRange) -> usize {
        range
            .into_iter()
            .filter(|&vpn| self.page_table.unmap(vpn).is_ok())
            .count()
    }

    /// 装入 `vaddr` 所在页的后备帧，返回其物理页号
    ///
    /// 保护页区域、没有后备对象的区域以及不在任何区域内的地址都会被拒绝。
    pub fn populate(&mut self, vaddr: Vaddr) -> MmResult<Ppn> {
        let vpn = Vpn::from_addr_floor(vaddr);
        if let Some((ppn, _)) = self.page_table.walk(vpn) {
            return Ok(ppn);
        }
        let region = self.regions.find(vaddr).ok_or(MmError::InvalidAddress)?;
        if region.flags().contains(VmFlags::GUARD) {
            return Err(MmError::InvalidAddress);
        }
        let object = region.object().ok_or(MmError::InvalidAddress)?;
        let ppn = object.page(region.object_index(vpn))?;
        let flags = region.flags().pte_flags();
        self.page_table.map(vpn, ppn, flags)?;
        Ok(ppn)
    }

    /// 把用户虚拟地址解析为物理地址，必要时按需装页
    ///
    /// 不在区域内、非用户区域、对只读区域写入都返回 `InvalidAddress`。
    pub fn translate_user(&mut self, vaddr: Vaddr, write: bool) -> MmResult<Paddr> {
        let region = self.regions.find(vaddr).ok_or(MmError::InvalidAddress)?;
        let flags = region.flags();
        if !flags.contains(VmFlags::USER) || (write && !flags.contains(VmFlags::WRITABLE)) {
            return Err(MmError::InvalidAddress);
        }
        let ppn = self.populate(vaddr)?;
        Ok(Paddr::from_usize(
            ppn.start_addr().as_usize() + vaddr.page_offset(),
        ))
    }

    fn user_word(&mut self, vaddr: Vaddr, write: bool) -> MmResult<&AtomicU32> {
        if !vaddr.is_aligned_to(core::mem::size_of::<u32>()) {
            return Err(MmError::InvalidAddress);
        }
        let paddr = self.translate_user(vaddr, write)?;
        // SAFETY: 对齐的用户字位于已装入的帧内；其它地址空间可能并发访问，
        // 因此以原子方式读写
        Ok(unsafe { &*paddr.as_kernel_ptr::<AtomicU32>() })
    }

    /// 读取用户态 32 位字
    pub fn read_u32(&mut self, vaddr: Vaddr) -> MmResult<u32> {
        Ok(self.user_word(vaddr, false)?.load(Ordering::SeqCst))
    }

    /// 写入用户态 32 位字
    pub fn write_u32(&mut self, vaddr: Vaddr, value: u32) -> MmResult<()> {
        self.user_word(vaddr, true)?.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// 分配一个用户栈，返回栈的页号区间
    ///
    /// 栈紧贴在最低的内核保留区域（或此前分配的栈/保护页）下方，
    /// 两者之间隔一页不映射的保护页。没有这类区域时以用户空间上界为边界。
    pub fn alloc_user_stack(&mut self) -> MmResult<VpnRange> {
        let boundary = self
            .regions
            .iter()
            .filter(|r| {
                r.flags()
                    .intersects(VmFlags::KERNEL | VmFlags::STACK | VmFlags::GUARD)
            })
            .map(|r| r.range().start())
            .min()
            .unwrap_or_else(|| {
                Vpn::from_addr_floor(Vaddr::from_usize(crate::mm_config().user_space_end()))
            });

        let stack_pages = crate::mm_config().user_stack_size().div_ceil(PAGE_SIZE);
        let guard_start = boundary
            .as_usize()
            .checked_sub(1)
            .ok_or(MmError::WouldUnderflow)?;
        let stack_start = guard_start
            .checked_sub(stack_pages)
            .ok_or(MmError::WouldUnderflow)?;

        let guard = VpnRange::new(Vpn(guard_start), boundary);
        let stack = VpnRange::new(Vpn(stack_start), Vpn(guard_start));
        if !self.regions.is_free(guard) || !self.regions.is_free(stack) {
            return Err(MmError::WouldOverlap);
        }

        self.map_region(VmRegion::new(
            guard,
            VmFlags::USER | VmFlags::GUARD,
            RegionType::UserGuard,
        ))?;
        self.map_region(
            VmRegion::new(
                stack,
                VmFlags::USER | VmFlags::WRITABLE | VmFlags::STACK | VmFlags::NO_EXEC,
                RegionType::UserStack,
            )
            .with_object(MemoryObject::anonymous(), 0),
        )?;
        Ok(stack)
    }

    /// 把 `other` 中该类型区域的后备对象以相同区间映射到本地址空间
    pub fn clone_shared(&mut self, other: &AddressSpace, kind: RegionType) -> MmResult<()> {
        let source = other.regions.get(kind).ok_or(MmError::NotFound)?;
        let object: Arc<MemoryObject> = source.object().cloned().ok_or(MmError::InvalidFlags)?;
        let region = VmRegion::new(source.range(), source.flags() | VmFlags::SHARED, kind)
            .with_object(object, source.offset());
        self.map_region(region)
    }

    /// 把该类型第一个区域的末端后移 `n` 页
    pub fn extend_end(&mut self, kind: RegionType, n: usize) -> MmResult<()> {
        self.regions.extend_end(kind, n)
    }

    /// 把该类型第一个区域的末端前移 `n` 页，并拆除被截掉的页
    pub fn contract_end(&mut self, kind: RegionType, n: usize) -> MmResult<()> {
        self.regions.contract_end(kind, n)?;
        let region = self.regions.get(kind).ok_or(MmError::NotFound)?;
        let cut = VpnRange::from_start_len(region.range().end(), n);
        let object = region.object().cloned();
        let tail_index = region.object_index(region.range().end());
        self.unmap_pages(cut);
        if let Some(object) = object
            && !object_is_shared(&object)
        {
            object.discard_from(tail_index);
        }
        Ok(())
    }

    /// 拆除所有区域并释放后备对象引用，返回拆除的区域数
    pub fn release_all(&mut self) -> usize {
        let regions = self.regions.take_all();
        let count = regions.len();
        for region in regions.iter() {
            self.unmap_pages(region.range());
        }
        count
    }
}

/// 除了调用方手里这一份之外，是否还有别的区域引用该对象
fn object_is_shared(object: &Arc<MemoryObject>) -> bool {
    // 区域自身 + 调用方临时克隆
    Arc::strong_count(object) > 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_rw() -> VmFlags {
        VmFlags::USER | VmFlags::WRITABLE
    }

    fn anon_region(start: usize, end: usize, kind: RegionType) -> VmRegion {
        VmRegion::from_addrs(start, end, user_rw(), kind)
            .unwrap()
            .with_object(MemoryObject::anonymous(), 0)
    }

    #[test]
    fn test_map_region_rejects_overlap() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        space.map_region(anon_region(0x1000, 0x3000, RegionType::UserData)).unwrap();
        assert_eq!(
            space.map_region(anon_region(0x2000, 0x4000, RegionType::UserHeap)),
            Err(MmError::WouldOverlap)
        );
        space.map_region(anon_region(0x3000, 0x4000, RegionType::UserHeap)).unwrap();
        assert!(space.regions().is_well_formed());
    }

    #[test]
    fn test_user_word_roundtrip_and_permissions() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        space.map_region(anon_region(0x10000, 0x12000, RegionType::UserData)).unwrap();
        let ro = VmRegion::from_addrs(0x20000, 0x21000, VmFlags::USER, RegionType::UserText)
            .unwrap()
            .with_object(MemoryObject::anonymous(), 0);
        space.map_region(ro).unwrap();

        let va = Vaddr::from_usize(0x11008);
        assert_eq!(space.read_u32(va), Ok(0));
        space.write_u32(va, 0xdead_beef).unwrap();
        assert_eq!(space.read_u32(va), Ok(0xdead_beef));

        assert_eq!(space.write_u32(Vaddr::from_usize(0x20000), 1), Err(MmError::InvalidAddress));
        assert_eq!(space.read_u32(Vaddr::from_usize(0x11002)), Err(MmError::InvalidAddress));
        assert_eq!(space.read_u32(Vaddr::from_usize(0x30000)), Err(MmError::InvalidAddress));
    }

    #[test]
    fn test_unmap_region_tears_down_pages() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        space.map_region(anon_region(0x10000, 0x12000, RegionType::UserHeap)).unwrap();
        space.populate(Vaddr::from_usize(0x10000)).unwrap();
        space.populate(Vaddr::from_usize(0x11000)).unwrap();

        let region = space.unmap_region(RegionType::UserHeap).unwrap();
        assert_eq!(region.object().unwrap().resident_pages(), 2);
        assert!(space.page_table().translate(Vaddr::from_usize(0x10000)).is_none());
        assert_eq!(space.unmap_region(RegionType::UserHeap).err(), Some(MmError::NotFound));
    }

    #[test]
    fn test_stack_below_kernel_region_with_guard() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        let kernel_base = 0x30_0000_0000usize;
        space
            .map_region(
                VmRegion::from_addrs(
                    kernel_base,
                    kernel_base + 0x10_0000,
                    VmFlags::KERNEL | VmFlags::WRITABLE,
                    RegionType::KernelReserved,
                )
                .unwrap(),
            )
            .unwrap();

        let stack = space.alloc_user_stack().unwrap();
        let stack_bytes = stack.len() * PAGE_SIZE;
        assert_eq!(stack_bytes, 2 * 1024 * 1024);

        let guard = space.regions().get(RegionType::UserGuard).unwrap();
        assert_eq!(guard.start(), stack.end().start_addr());
        assert_eq!(guard.end().as_usize(), kernel_base);
        assert_eq!(space.populate(guard.start()), Err(MmError::InvalidAddress));

        // 第二个栈放在第一个栈的下方
        let second = space.alloc_user_stack().unwrap();
        assert_eq!(second.end() + 1, stack.start());
        assert!(space.regions().is_well_formed());

        // 栈顶附近可写
        let top = Vaddr::from_usize(stack.end().start_addr().as_usize() - 4);
        space.write_u32(top, 7).unwrap();
        assert_eq!(space.read_u32(top), Ok(7));
    }

    #[test]
    fn test_first_stack_uses_user_space_end() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        let stack = space.alloc_user_stack().unwrap();
        let end = crate::mm_config().user_space_end();
        assert_eq!(stack.end().start_addr().as_usize() + PAGE_SIZE, end);
    }

    #[test]
    fn test_clone_shared_sees_same_memory() {
        crate::test_init::init();
        let mut a = AddressSpace::new().unwrap();
        let mut b = AddressSpace::new().unwrap();
        a.map_region(anon_region(0x40000, 0x41000, RegionType::UserShared)).unwrap();
        b.clone_shared(&a, RegionType::UserShared).unwrap();

        let va = Vaddr::from_usize(0x40010);
        a.write_u32(va, 99).unwrap();
        assert_eq!(b.read_u32(va), Ok(99));
        assert_eq!(a.translate_user(va, false), b.translate_user(va, false));
        assert!(b.regions().get(RegionType::UserShared).unwrap().flags().contains(VmFlags::SHARED));
    }

    #[test]
    fn test_release_all() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        space.map_region(anon_region(0x1000, 0x2000, RegionType::UserData)).unwrap();
        space.alloc_user_stack().unwrap();
        space.populate(Vaddr::from_usize(0x1000)).unwrap();
        assert_eq!(space.release_all(), 3);
        assert!(space.regions().is_empty());
        assert!(space.page_table().translate(Vaddr::from_usize(0x1000)).is_none());
    }

    #[test]
    fn test_map_physical_page() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        let frame = crate::alloc_frame().unwrap();
        let va = Vaddr::from_usize(0x5000);
        space.map_physical_page(va, frame.paddr(), UniversalPTEFlag::user_rw()).unwrap();
        assert_eq!(space.page_table().translate(va), Some(frame.paddr()));
        assert_eq!(
            space.map_physical_page(Vaddr::from_usize(0x5001), frame.paddr(), UniversalPTEFlag::user_rw()),
            Err(MmError::InvalidAddress)
        );
    }

    #[test]
    fn test_contract_end_unmaps_tail() {
        crate::test_init::init();
        let mut space = AddressSpace::new().unwrap();
        space.map_region(anon_region(0x1000, 0x4000, RegionType::UserHeap)).unwrap();
        space.populate(Vaddr::from_usize(0x3000)).unwrap();
        space.contract_end(RegionType::UserHeap, 1).unwrap();
        assert!(space.page_table().translate(Vaddr::from_usize(0x3000)).is_none());
        let heap = space.regions().get(RegionType::UserHeap).unwrap();
        assert_eq!(heap.object().unwrap().resident_pages(), 0);
        space.extend_end(RegionType::UserHeap, 1).unwrap();
        assert_eq!(space.read_u32(Vaddr::from_usize(0x3000)), Ok(0));
    }
}
