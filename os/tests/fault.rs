//! fault 集成测试

mod common;

use mm::{RegionType, Vaddr};
use os::{Fault, FaultAccess, FaultOutcome, handle_fault};

#[test]
fn test_stack_fault_is_resolved() {
    let kernel = common::boot();
    let task = kernel.spawn(None, 0x1000).unwrap();
    let top = task.context().sp;

    let outcome = handle_fault(
        &kernel,
        &task,
        Fault::PageFault {
            addr: Vaddr::from_usize(top - 8),
            access: FaultAccess::WRITE | FaultAccess::USER,
        },
    );
    assert_eq!(outcome, FaultOutcome::Resumed);
    assert!(!task.is_exiting());

    let space = task.process().space().lock();
    assert!(
        space
            .page_table()
            .translate(Vaddr::from_usize(top - 8))
            .is_some()
    );
}

#[test]
fn test_guard_page_hit_kills_process() {
    let kernel = common::boot();
    let task = kernel.spawn(None, 0x1000).unwrap();
    let guard = task
        .process()
        .space()
        .lock()
        .regions()
        .get(RegionType::UserGuard)
        .unwrap()
        .start();

    let outcome = handle_fault(
        &kernel,
        &task,
        Fault::PageFault {
            addr: guard,
            access: FaultAccess::WRITE | FaultAccess::USER,
        },
    );
    assert_eq!(outcome, FaultOutcome::Killed);
    assert!(task.process().is_exiting());
}

#[test]
fn test_fault_outside_regions_kills_process() {
    let kernel = common::boot();
    let task = kernel.spawn(None, 0x1000).unwrap();
    let outcome = handle_fault(
        &kernel,
        &task,
        Fault::PageFault {
            addr: Vaddr::from_usize(0x5000),
            access: FaultAccess::READ | FaultAccess::USER,
        },
    );
    assert_eq!(outcome, FaultOutcome::Killed);
    assert!(task.is_exiting());
}

#[test]
fn test_write_to_read_only_region_kills_process() {
    let kernel = common::boot();
    let root = kernel.mounts().root().unwrap();
    root.create("ro", 0o444).unwrap();
    let task = kernel.spawn(None, 0x1000).unwrap();
    let start = Vaddr::from_usize(0x40_0000);
    kernel.map_file(task.process(), "/ro", start, 1).unwrap();

    let read = handle_fault(
        &kernel,
        &task,
        Fault::PageFault {
            addr: start,
            access: FaultAccess::READ | FaultAccess::USER,
        },
    );
    assert_eq!(read, FaultOutcome::Resumed);

    let write = handle_fault(
        &kernel,
        &task,
        Fault::PageFault {
            addr: start,
            access: FaultAccess::WRITE | FaultAccess::USER,
        },
    );
    assert_eq!(write, FaultOutcome::Killed);
}

#[test]
fn test_non_page_faults_are_fatal() {
    let kernel = common::boot();
    for fault in [
        Fault::GeneralProtection,
        Fault::DoubleFault,
        Fault::InvalidOpcode,
    ] {
        let task = kernel.spawn(None, 0x1000).unwrap();
        kernel.sched().set_fpu_owner(0, task.process().pid()).unwrap();
        assert_eq!(handle_fault(&kernel, &task, fault), FaultOutcome::Killed);
        assert!(task.process().is_exiting());
        assert_eq!(kernel.sched().fpu_owner(0), None);
    }
}

#[test]
fn test_killed_task_is_reaped() {
    let kernel = common::boot();
    let task = kernel.spawn(None, 0x1000).unwrap();
    let pid = task.process().pid();
    handle_fault(&kernel, &task, Fault::InvalidOpcode);
    drop(task);

    assert!(kernel.schedule(0).unwrap().is_none());
    assert!(!kernel.processes().contains(pid));
}
