//! 集成测试公共设施：把平台钩子委托给 test-support 的模拟实现

#![allow(dead_code)]

use std::sync::{Arc, Once};

use mm::{MemoryObject, RegionType, VmFlags, VmRegion};
use os::{Kernel, KernelConfig};
use task::Task;
use test_support::mock::mm::{MOCK_MM_CONFIG, MOCK_MM_OPS};
use test_support::mock::task::MOCK_TASK_OPS;

struct MmOps;

impl mm::ArchMmOps for MmOps {
    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MOCK_MM_OPS.paddr_to_vaddr(paddr)
    }

    fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        MOCK_MM_OPS.vaddr_to_paddr(vaddr)
    }

    fn flush_tlb_local(&self, vaddr: usize) {
        MOCK_MM_OPS.flush_tlb_local(vaddr)
    }
}

struct MmConfig;

impl mm::MmConfig for MmConfig {
    fn user_stack_size(&self) -> usize {
        MOCK_MM_CONFIG.user_stack_size()
    }

    fn user_space_end(&self) -> usize {
        MOCK_MM_CONFIG.user_space_end()
    }
}

struct TaskOps;

impl task::TaskOps for TaskOps {
    fn send_ipi(&self, cpu: usize) {
        MOCK_TASK_OPS.send_ipi(cpu)
    }

    fn current_cpu(&self) -> usize {
        MOCK_TASK_OPS.current_cpu()
    }

    fn yield_now(&self) {
        MOCK_TASK_OPS.yield_now()
    }
}

static INIT: Once = Once::new();

fn init_hooks() {
    INIT.call_once(|| {
        // SAFETY: 在 Once 内只执行一次
        unsafe {
            mm::register_arch_ops(&MmOps);
            mm::register_config(&MmConfig);
            task::register_task_ops(&TaskOps);
            let _ = os::log::init(None, log::LevelFilter::Trace);
        }
    });
}

/// 以模拟物理内存启动一个内核上下文
pub fn boot() -> Kernel {
    init_hooks();
    let (phys_start, phys_end) = MOCK_MM_OPS.phys_range();
    Kernel::boot(KernelConfig {
        cpu_count: 2,
        phys_start,
        phys_end,
        ..KernelConfig::default()
    })
    .expect("boot")
}

/// 在任务所属进程中映射一页可写的匿名用户数据
pub fn map_user_data(task: &Arc<Task>, start: usize) {
    let region = VmRegion::from_addrs(
        start,
        start + mm::PAGE_SIZE,
        VmFlags::USER | VmFlags::WRITABLE | VmFlags::NO_EXEC,
        RegionType::UserData,
    )
    .expect("region")
    .with_object(MemoryObject::anonymous(), 0);
    task.process()
        .space()
        .lock()
        .map_region(region)
        .expect("map user data");
}
