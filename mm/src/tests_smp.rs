//! Multi-threaded allocator tests.
//!
//! Host threads stand in for CPUs; `IrqMutex` spins the same way on both.

use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;
use std::vec::Vec;

use crate::test_fixtures::TestArena;

const THREADS: usize = 8;

#[test]
fn test_smp_concurrent_alloc_distinct() {
    let arena = TestArena::new(THREADS);
    let alloc = arena.booted();
    let barrier = Barrier::new(THREADS);

    let pages: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    alloc.alloc_page()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(pages.iter().all(Option::is_some));
    let distinct: HashSet<_> = pages.iter().flatten().copied().collect();
    assert_eq!(distinct.len(), THREADS);
    assert!(distinct.iter().all(|&page| alloc.ref_count(page) == 1));
    assert_eq!(alloc.alloc_page(), None);
}

#[test]
fn test_smp_concurrent_sharing_balances() {
    const ROUNDS: usize = 2_000;

    let arena = TestArena::new(1);
    let alloc = arena.booted();
    let page = alloc.alloc_page().unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..ROUNDS {
                    alloc.add_reference(page);
                    alloc.remove_reference(page);
                }
            });
        }
    });

    assert_eq!(alloc.ref_count(page), 1);
    assert_eq!(alloc.stats().free, 0);
}

#[test]
fn test_smp_shared_page_freed_once() {
    let arena = TestArena::new(2);
    let alloc = arena.booted();
    let page = alloc.alloc_page().unwrap();
    for _ in 1..THREADS {
        alloc.add_reference(page);
    }
    assert_eq!(alloc.ref_count(page), THREADS as i32);

    let barrier = Barrier::new(THREADS);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                alloc.free_page(page);
            });
        }
    });

    assert_eq!(alloc.ref_count(page), 0);
    assert_eq!(TestArena::chain(&alloc).iter().filter(|&&p| p == page).count(), 1);
    assert_eq!(alloc.stats().free, 2);
}

#[test]
fn test_smp_alloc_free_churn() {
    const PAGES: usize = 32;
    const ROUNDS: usize = 500;

    let arena = TestArena::new(PAGES);
    let alloc = arena.booted();
    let layout = arena.layout();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut held = Vec::with_capacity(4);
                for round in 0..ROUNDS {
                    if let Some(page) = alloc.alloc_page() {
                        assert!(layout.contains(page));
                        assert_eq!(alloc.ref_count(page), 1);
                        held.push(page);
                    }
                    if held.len() == 4 || round % 3 == 0 {
                        for page in held.drain(..) {
                            alloc.free_page(page);
                        }
                    }
                }
                for page in held {
                    alloc.free_page(page);
                }
            });
        }
    });

    let chain = TestArena::chain(&alloc);
    assert_eq!(chain.len(), PAGES);
    assert_eq!(chain.iter().collect::<HashSet<_>>().len(), PAGES);
}
