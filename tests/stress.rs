//! Destruction accounting: the pointee must be dropped exactly once, by
//! whichever handle releases the last share, including under concurrent
//! clone/drop traffic on one allocation.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::thread;
use shared_pointer::Shared;

const THREADS: usize = 8;
const CLONES_PER_THREAD: usize = 1000;

struct Sentinel<'a>(&'a AtomicUsize);

impl Drop for Sentinel<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn pointee_dropped_exactly_once() {
    let drops = AtomicUsize::new(0);
    {
        let r = Shared::new(Sentinel(&drops));
        let p = r.clone();
        let q = p.clone();
        assert_eq!(Shared::use_count(&q), 3);

        drop(r);
        drop(p);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(Shared::use_count(&q), 1);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_frees_the_last_share() {
    let drops = AtomicUsize::new(0);
    let mut r = Shared::new(Sentinel(&drops));

    Shared::reset(&mut r);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_raw_frees_the_old_allocation() {
    let drops = AtomicUsize::new(0);
    let mut r = Shared::new(Sentinel(&drops));

    unsafe { Shared::reset_raw(&mut r, Box::into_raw(Box::new(Sentinel(&drops)))) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(Shared::use_count(&r), 1);

    drop(r);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn take_transfers_instead_of_dropping() {
    let drops = AtomicUsize::new(0);
    let mut r = Shared::new(Sentinel(&drops));

    let p = Shared::take(&mut r);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(r);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(p);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_clone_and_drop_loses_no_updates() {
    let drops = AtomicUsize::new(0);
    let root = Shared::new(Sentinel(&drops));

    thread::scope(|s| {
        for _ in 0..THREADS {
            let handle = root.clone();
            s.spawn(move |_| {
                for _ in 0..CLONES_PER_THREAD {
                    let alias = handle.clone();
                    assert!(!Shared::is_null(&alias));
                }
            });
        }
    })
    .unwrap();

    assert_eq!(Shared::use_count(&root), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(root);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
