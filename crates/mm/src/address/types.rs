//! 地址类型

use core::fmt;

use super::PAGE_SIZE;

macro_rules! impl_address {
    ($type:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $type(pub usize);

        impl $type {
            /// 由 usize 构造
            pub const fn from_usize(value: usize) -> Self {
                Self(value)
            }

            /// 取出 usize 值
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// 页内偏移
            pub const fn page_offset(self) -> usize {
                self.0 & (PAGE_SIZE - 1)
            }

            /// 是否页对齐
            pub const fn is_page_aligned(self) -> bool {
                self.page_offset() == 0
            }

            /// 是否按 `align` 字节对齐
            pub const fn is_aligned_to(self, align: usize) -> bool {
                self.0 % align == 0
            }

            /// 向下对齐到页边界
            pub const fn align_down_to_page(self) -> Self {
                Self(self.0 & !(PAGE_SIZE - 1))
            }

            /// 增加字节偏移，溢出时返回 None
            pub const fn checked_add(self, bytes: usize) -> Option<Self> {
                match self.0.checked_add(bytes) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($type), self.0)
            }
        }

        impl fmt::LowerHex for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

impl_address!(Paddr, "物理地址");
impl_address!(Vaddr, "虚拟地址");

impl Paddr {
    /// 通过直接映射区域得到内核可访问的指针
    pub fn as_kernel_ptr<T>(self) -> *mut T {
        crate::arch_ops().paddr_to_vaddr(self.0) as *mut T
    }
}
