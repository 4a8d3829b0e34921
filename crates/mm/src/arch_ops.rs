//! 架构相关内存管理操作 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关内存管理操作
///
/// os crate 为具体平台实现此 trait 并在启动时注册。
pub trait ArchMmOps: Send + Sync {
    /// 将物理地址转换为内核可访问的虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;

    /// 将直接映射区域内的虚拟地址转换为物理地址
    fn vaddr_to_paddr(&self, vaddr: usize) -> usize;

    /// 使本核 TLB 中 `vaddr` 所在页的条目失效
    fn flush_tlb_local(&self, vaddr: usize);
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchMmOps) {
    let ptr = ops as *const dyn ArchMmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ArchMmOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`] 注册实现，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchMmOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            return &test_support::mock::mm::MOCK_MM_OPS;
        }
        #[cfg(not(test))]
        panic!("mm: ArchMmOps not registered");
    }
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchMmOps>((data, vtable)) }
}

#[cfg(test)]
impl ArchMmOps for test_support::mock::mm::MockMmOps {
    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        test_support::mock::mm::MockMmOps::paddr_to_vaddr(self, paddr)
    }

    fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        test_support::mock::mm::MockMmOps::vaddr_to_paddr(self, vaddr)
    }

    fn flush_tlb_local(&self, vaddr: usize) {
        test_support::mock::mm::MockMmOps::flush_tlb_local(self, vaddr)
    }
}
