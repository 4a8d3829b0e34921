//! 三级页表实现

use alloc::vec::Vec;

use super::{ENTRIES_PER_TABLE, LEVELS, PageTableEntry, UniversalPTEFlag, VPN_BITS};
use crate::address::{PageNum, Paddr, Ppn, Vaddr, Vpn};
use crate::error::{MmError, MmResult};
use crate::frame_allocator::{FrameTracker, alloc_frame};

/// 三级页表
///
/// 根页和所有中间页表帧都由本结构持有，drop 时归还帧分配器。
/// 叶子项指向的数据帧不归页表所有。
pub struct PageTable {
    root: FrameTracker,
    tables: Vec<FrameTracker>,
}

/// 取出某个页表页的表项数组
///
/// # Safety
/// `ppn` 必须是本页表持有的页表帧，且调用者对其拥有相应的访问权
unsafe fn table_at<'a>(ppn: Ppn) -> &'a mut [PageTableEntry; ENTRIES_PER_TABLE] {
    // SAFETY: 页表帧大小恰为 512 个 8 字节表项
    unsafe { &mut *ppn.start_addr().as_kernel_ptr::<[PageTableEntry; ENTRIES_PER_TABLE]>() }
}

/// 第 `level` 级（2 为根）的索引
fn index(vpn: Vpn, level: usize) -> usize {
    (vpn.0 >> (9 * level)) & (ENTRIES_PER_TABLE - 1)
}

impl PageTable {
    /// 创建只有根页的空页表
    pub fn new() -> MmResult<Self> {
        Ok(Self {
            root: alloc_frame().ok_or(MmError::OutOfMemory)?,
            tables: Vec::new(),
        })
    }

    /// 根页表的物理页号
    pub fn root_ppn(&self) -> Ppn {
        self.root.ppn()
    }

    /// 页表占用的帧数（含根页）
    pub fn table_frames(&self) -> usize {
        1 + self.tables.len()
    }

    fn check_vpn(vpn: Vpn) -> MmResult<()> {
        if vpn.0 >> VPN_BITS != 0 {
            return Err(MmError::InvalidAddress);
        }
        Ok(())
    }

    /// 查找叶子表项，必要时创建中间页表
    fn find_pte_create(&mut self, vpn: Vpn) -> MmResult<&mut PageTableEntry> {
        Self::check_vpn(vpn)?;
        let mut ppn = self.root.ppn();
        for level in (1..LEVELS).rev() {
            // SAFETY: ppn 是本页表持有的页表帧，&mut self 保证独占
            let pte = unsafe { &mut table_at(ppn)[index(vpn, level)] };
            if !pte.is_valid() {
                let frame = alloc_frame().ok_or(MmError::OutOfMemory)?;
                *pte = PageTableEntry::new(frame.ppn(), UniversalPTEFlag::VALID);
                self.tables.push(frame);
            } else if pte.is_leaf() {
                return Err(MmError::AlreadyMapped);
            }
            ppn = pte.ppn();
        }
        // SAFETY: 同上
        Ok(unsafe { &mut table_at(ppn)[index(vpn, 0)] })
    }

    /// 查找叶子表项所在位置，不创建中间页表
    fn find_pte(&self, vpn: Vpn) -> Option<*mut PageTableEntry> {
        if vpn.0 >> VPN_BITS != 0 {
            return None;
        }
        let mut ppn = self.root.ppn();
        for level in (1..LEVELS).rev() {
            // SAFETY: 只读访问本页表持有的页表帧
            let pte = unsafe { table_at(ppn)[index(vpn, level)] };
            if !pte.is_valid() || pte.is_leaf() {
                return None;
            }
            ppn = pte.ppn();
        }
        // SAFETY: 同上
        Some(unsafe { &mut table_at(ppn)[index(vpn, 0)] as *mut _ })
    }

    /// 建立 `vpn -> ppn` 映射
    ///
    /// 只写不读的组合无效；已映射的页返回 `AlreadyMapped`，
    /// 中间页表帧耗尽返回 `OutOfMemory`。
    pub fn map(&mut self, vpn: Vpn, ppn: Ppn, flags: UniversalPTEFlag) -> MmResult<()> {
        let flags = flags | UniversalPTEFlag::VALID;
        if !flags.is_leaf()
            || (flags.contains(UniversalPTEFlag::WRITEABLE)
                && !flags.contains(UniversalPTEFlag::READABLE))
        {
            return Err(MmError::InvalidFlags);
        }
        let pte = self.find_pte_create(vpn)?;
        if pte.is_valid() {
            return Err(MmError::AlreadyMapped);
        }
        *pte = PageTableEntry::new(ppn, flags);
        Ok(())
    }

    /// 解除映射，返回原来映射到的物理页号，并使本核 TLB 条目失效
    pub fn unmap(&mut self, vpn: Vpn) -> MmResult<Ppn> {
        let pte = self.find_pte(vpn).ok_or(MmError::NotMapped)?;
        // SAFETY: find_pte 返回本页表内的有效位置，&mut self 保证独占
        let pte = unsafe { &mut *pte };
        if !pte.is_leaf() {
            return Err(MmError::NotMapped);
        }
        let ppn = pte.ppn();
        *pte = PageTableEntry::EMPTY;
        crate::arch_ops().flush_tlb_local(vpn.start_addr().as_usize());
        Ok(ppn)
    }

    /// 修改已映射页的标志
    pub fn update_flags(&mut self, vpn: Vpn, flags: UniversalPTEFlag) -> MmResult<()> {
        let pte = self.find_pte(vpn).ok_or(MmError::NotMapped)?;
        // SAFETY: 同 unmap
        let pte = unsafe { &mut *pte };
        if !pte.is_leaf() {
            return Err(MmError::NotMapped);
        }
        let flags = flags | UniversalPTEFlag::VALID;
        if !flags.is_leaf() {
            return Err(MmError::InvalidFlags);
        }
        *pte = PageTableEntry::new(pte.ppn(), flags);
        crate::arch_ops().flush_tlb_local(vpn.start_addr().as_usize());
        Ok(())
    }

    /// 查询叶子映射
    pub fn walk(&self, vpn: Vpn) -> Option<(Ppn, UniversalPTEFlag)> {
        // SAFETY: 只读
        let pte = unsafe { *self.find_pte(vpn)? };
        pte.is_leaf().then(|| (pte.ppn(), pte.flags()))
    }

    /// 翻译虚拟地址
    pub fn translate(&self, vaddr: Vaddr) -> Option<Paddr> {
        let (ppn, _) = self.walk(Vpn::from_addr_floor(vaddr))?;
        ppn.start_addr().checked_add(vaddr.page_offset())
    }
}
