use kernel_sync::{IrqGuard, SpinLock, SpinLockGuard};
use std::panic;

#[test]
fn basic_lock_and_raii() {
    let l = SpinLock::new(0_u32);

    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());

    let mut g = l.lock();
    *g += 1;
    assert_eq!(*g, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock();
    assert_eq!(g1.as_deref(), Some(&1));
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn optional_slot_is_filled_once_and_taken_back() {
    static SLOT: SpinLock<Option<Vec<u32>>> = SpinLock::new(None);

    assert!(SLOT.lock().is_none());
    *SLOT.lock() = Some(vec![1, 2]);
    SLOT.with_lock(|slot| {
        if let Some(v) = slot.as_mut() {
            v.push(3);
        }
    });
    assert_eq!(SLOT.lock().take(), Some(vec![1, 2, 3]));
    assert!(SLOT.lock().is_none());
}

#[test]
fn lock_irq_releases_lock_on_drop() {
    let l = SpinLock::new(String::from("a"));
    {
        let mut g = l.lock_irq();
        g.push('b');
        assert!(l.try_lock().is_none());
    }
    assert_eq!(l.into_inner(), "ab");
}

#[test]
fn irq_guard_is_inert_off_target() {
    let g = IrqGuard::new();
    assert!(!g.restores_interrupts());
}

#[test]
fn get_mut_allows_direct_mutation() {
    let mut l = SpinLock::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    let threads = 4;
    let iters = 2_000;

    let lock = Arc::new(SpinLock::new(0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|v| {
                        assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                        *v += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(lock.with_lock(|v| *v), threads * iters);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn leaked_guard_keeps_the_lock() {
    let l = SpinLock::new(5u32);
    let v = SpinLockGuard::leak(l.lock());
    *v += 1;
    assert_eq!(*v, 6);
    assert!(l.is_locked());
    assert!(l.try_lock().is_none());
}
