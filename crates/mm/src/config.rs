//! 内存管理配置 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 内存管理配置常量
pub trait MmConfig: Send + Sync {
    /// 用户栈大小（字节，页对齐）
    fn user_stack_size(&self) -> usize;

    /// 用户空间上界
    ///
    /// 内核保留区从这里开始向上延伸；尚无内核保留区域时，
    /// 第一个用户栈放在它的正下方。
    fn user_space_end(&self) -> usize;
}

static CONFIG_DATA: AtomicUsize = AtomicUsize::new(0);
static CONFIG_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册配置实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_config(config: &'static dyn MmConfig) {
    let ptr = config as *const dyn MmConfig;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn MmConfig, (usize, usize)>(ptr) };
    CONFIG_VTABLE.store(vtable, Ordering::Release);
    CONFIG_DATA.store(data, Ordering::Release);
}

/// 获取已注册的配置实现
///
/// # Panics
/// 如果尚未调用 [`register_config`] 注册实现，则 panic
#[inline]
pub fn mm_config() -> &'static dyn MmConfig {
    let data = CONFIG_DATA.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            return &test_support::mock::mm::MOCK_MM_CONFIG;
        }
        #[cfg(not(test))]
        panic!("mm: MmConfig not registered");
    }
    let vtable = CONFIG_VTABLE.load(Ordering::Acquire);
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn MmConfig>((data, vtable)) }
}

#[cfg(test)]
impl MmConfig for test_support::mock::mm::MockMmConfig {
    fn user_stack_size(&self) -> usize {
        test_support::mock::mm::MockMmConfig::user_stack_size(self)
    }

    fn user_space_end(&self) -> usize {
        test_support::mock::mm::MockMmConfig::user_space_end(self)
    }
}
