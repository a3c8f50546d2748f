mod common;

use common::*;
use kernel::arch::KernelReturn;
use kernel::process::ProcessImage;
use kernel::{KernelConfig, MAX_PROCESSES, ProcessState, SpawnError, TrapFrame};
use kernel_info::boot::{BootInfo, PhysRange};
use kernel_info::memory::{USER_STACK_BASE, USER_STACK_TOP};
use kernel_memory_addresses::VirtualAddress;
use kernel_syscall::Sysno;

#[test]
fn spawn_builds_initial_context() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    let pid = k.spawn_from_image(&program(), "init").unwrap();
    assert_eq!(pid, common::pid(1));

    let p = k.process_table().by_pid(pid).unwrap();
    assert_eq!(p.state, ProcessState::Runnable);
    assert_eq!(p.parent, None);
    assert_eq!(
        p.image,
        ProcessImage {
            entry: VirtualAddress::new(CODE),
            lowest: VirtualAddress::new(CODE),
            highest: VirtualAddress::new(USER_STACK_TOP),
            stack_base: VirtualAddress::new(USER_STACK_BASE),
            stack_top: VirtualAddress::new(USER_STACK_TOP),
        }
    );
    assert_eq!(p.context, TrapFrame::user_initial(p.image.entry, p.image.stack_top));
    assert_ne!(p.directory, k.vmm().kernel_directory());
    assert_eq!(k.current_pid(), None);
}

#[test]
fn round_robin_over_slots() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    for name in ["a", "b", "c"] {
        k.spawn_from_image(&program(), name).unwrap();
    }

    let mut frame = start(&mut k);
    let mut order = vec![k.current_pid().unwrap().as_u32()];
    for _ in 0..5 {
        call(&mut k, &mut frame, Sysno::Getpid, [0; 3]);
        order.push(k.current_pid().unwrap().as_u32());
    }
    assert_eq!(order, [1, 2, 3, 1, 2, 3]);

    // Each process kept its own getpid result.
    assert_eq!(saved_eax(&k, pid(1)), 1);
    assert_eq!(saved_eax(&k, pid(2)), 2);
}

#[test]
fn scheduler_activates_the_chosen_directory() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    k.spawn_from_image(&program(), "a").unwrap();
    k.spawn_from_image(&program(), "b").unwrap();

    let mut frame = start(&mut k);
    let dir_a = k.process_table().by_pid(pid(1)).unwrap().directory;
    assert_eq!(k.vmm().active_directory(), dir_a);

    call(&mut k, &mut frame, Sysno::Getpid, [0; 3]);
    let dir_b = k.process_table().by_pid(pid(2)).unwrap().directory;
    assert_eq!(k.vmm().active_directory(), dir_b);
    assert_eq!(k.vmm().mmu().active, Some(dir_b));
    assert_eq!(frame.cs, 0x1b);
}

#[test]
fn exited_process_is_never_scheduled_again() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    for name in ["a", "b", "c"] {
        k.spawn_from_image(&program(), name).unwrap();
    }

    let mut frame = start(&mut k);
    call(&mut k, &mut frame, Sysno::Getpid, [0; 3]);
    assert_eq!(k.current_pid(), Some(pid(2)));
    call(&mut k, &mut frame, Sysno::Exit, [3, 0, 0]);
    assert_eq!(k.process_table().state_of(pid(2)), ProcessState::Zombie);

    let mut order = vec![];
    for _ in 0..4 {
        order.push(k.current_pid().unwrap().as_u32());
        call(&mut k, &mut frame, Sysno::Getpid, [0; 3]);
    }
    assert_eq!(order, [3, 1, 3, 1]);
}

#[test]
fn idle_return_when_nothing_can_run() {
    let idle = KernelReturn {
        eip: 0x0010_4000,
        esp: 0x0009_f000,
    };
    let mut pmm = frames();
    let mut k = boot(&mut pmm, Files::default(), KernelConfig { idle: Some(idle) });
    k.spawn_from_image(&program(), "init").unwrap();

    let mut frame = start(&mut k);
    call(&mut k, &mut frame, Sysno::Exit, [0, 0, 0]);

    assert_eq!(k.current_pid(), None);
    assert_eq!(frame.cs, 0x08);
    assert_eq!((frame.ds, frame.ss), (0x10, 0x10));
    assert_eq!(frame.eip, idle.eip);
    assert_eq!(frame.useresp, idle.esp);
    assert_ne!(frame.eflags & 0x200, 0);
    assert_eq!(k.vmm().active_directory(), k.vmm().kernel_directory());
}

#[test]
fn idle_defaults_to_halting() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    k.spawn_from_image(&program(), "init").unwrap();
    let mut frame = start(&mut k);
    call(&mut k, &mut frame, Sysno::Exit, [0, 0, 0]);
    assert_eq!(frame.cs, 0x08);
    assert!(!frame.from_user());
}

#[test]
fn enter_first_describes_ring3_entry() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    assert!(k.enter_first().is_err());

    k.spawn_from_image(&program(), "init").unwrap();
    let t = k.enter_first().unwrap();
    assert_eq!(t.eip, CODE);
    assert_eq!(t.esp, USER_STACK_TOP);
    assert_eq!((t.cs, t.ds, t.eflags), (0x1b, 0x23, 0x202));
    assert_eq!(k.process_table().state_of(pid(1)), ProcessState::Running);
}

#[test]
fn full_table_spawn_allocates_nothing() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    for i in 0..MAX_PROCESSES {
        k.spawn_from_image(&program(), &format!("p{i}")).unwrap();
    }

    let before = k.frame_stats();
    let err = k.spawn_from_image(&program(), "one-too-many").unwrap_err();
    assert!(matches!(err, SpawnError::Process(_)));
    assert_eq!(k.frame_stats(), before);
    assert_eq!(k.process_table().len(), MAX_PROCESSES);
}

#[test]
fn failed_load_returns_its_frames() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    let before = k.frame_stats();

    let below_base = elf(0x1000, &[(0x0010_0000, 5, b"x", 1)]);
    assert!(matches!(k.spawn_from_image(&below_base, "bad"), Err(SpawnError::Load(_))));
    assert!(matches!(k.spawn_from_image(b"not an elf", "bad"), Err(SpawnError::Load(_))));
    assert_eq!(k.spawn_from_path("bin/none"), Err(SpawnError::NotFound));

    assert_eq!(k.frame_stats(), before);
    assert!(k.process_table().is_empty());
}

#[test]
fn spawn_from_path_uses_the_file_system() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    let pid = k.spawn_from_path("bin/hello").unwrap();
    let p = k.process_table().by_pid(pid).unwrap();
    assert_eq!(p.name.as_str(), "bin/hello");
    assert_eq!(p.image.entry, VirtualAddress::new(OTHER_ENTRY));
}

#[test]
fn user_pointer_gate() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    k.spawn_from_image(&program(), "init").unwrap();
    assert!(!k.user_pointer_ok(DATA, 4), "no current process");

    let _frame = start(&mut k);
    assert!(k.user_pointer_ok(DATA, MSG.len() as u32));
    assert!(k.user_pointer_ok(CODE, 4));
    assert!(k.user_pointer_ok(USER_STACK_TOP - 4, 4));
    assert!(k.user_pointer_ok(DATA, DATA_LEN));

    assert!(!k.user_pointer_ok(DATA, 0));
    assert!(!k.user_pointer_ok(0xFFFF_FFF0, 0x20));
    assert!(!k.user_pointer_ok(CODE - 0x10, 0x20), "starts below lowest");
    assert!(!k.user_pointer_ok(USER_STACK_TOP - 4, 8), "ends above highest");
    assert!(!k.user_pointer_ok(CODE + 0x1000, 4), "unmapped hole");
    assert!(!k.user_pointer_ok(CODE + 0xFFC, 8), "runs into the hole");
    assert!(!k.user_pointer_ok(0x0010_0000, 4), "kernel memory");
}

#[test]
fn listing_shows_every_process() {
    let mut pmm = frames();
    let mut k = kernel(&mut pmm);
    k.spawn_from_image(&program(), "init").unwrap();
    let mut frame = start(&mut k);
    call(&mut k, &mut frame, Sysno::Fork, [0; 3]);

    let rows: Vec<String> = k.processes().map(|p| p.to_string()).collect();
    assert_eq!(rows, ["1    0     runnable init", "2    1     running  init"]);
}

#[test]
fn init_requires_a_memory_map() {
    let mut pmm = frames();
    let boot = BootInfo::new(&[], PhysRange::new(0x10_0000, 0x11_0000));
    let err = TestKernel::init(
        &boot,
        &mut pmm,
        kernel_vmem::testing::TestPhys::with_frames(16),
        kernel_vmem::testing::RecordingMmu::default(),
        Files::default(),
        TestConsole::default(),
        KernelConfig::default(),
    )
    .err();
    assert!(matches!(err, Some(kernel::KernelInitError::Frames(_))));
}
