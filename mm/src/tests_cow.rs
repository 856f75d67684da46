use crate::cow::cow_break;
use crate::error::MmError;
use crate::mm_constants::PAGE_SIZE_4KB_USIZE;
use crate::page_alloc::OwnedPage;
use crate::test_fixtures::TestArena;

#[test]
fn test_cow_single_ref_keeps_page() {
    let arena = TestArena::new(2);
    let alloc = arena.booted();
    let page = alloc.alloc_page().unwrap();

    assert_eq!(cow_break(&alloc, page), Ok(page));
    assert_eq!(alloc.ref_count(page), 1);
    assert_eq!(alloc.stats().free, 1);
}

#[test]
fn test_cow_multi_ref_copies() {
    let arena = TestArena::new(3);
    let alloc = arena.booted();

    let parent = OwnedPage::alloc_zeroed(&alloc).unwrap();
    unsafe {
        let bytes = parent.as_mut_ptr::<u8>();
        for i in 0..PAGE_SIZE_4KB_USIZE {
            bytes.add(i).write((i % 251) as u8);
        }
    }
    let child = parent.share().into_phys();
    assert_eq!(parent.ref_count(), 2);

    let private = cow_break(&alloc, child).unwrap();
    assert_ne!(private, parent.phys_addr());
    assert_eq!(parent.ref_count(), 1);
    assert_eq!(alloc.ref_count(private), 1);
    assert_eq!(arena.read_page(private), arena.read_page(parent.phys_addr()));

    alloc.free_page(private);
    drop(parent);
    assert_eq!(alloc.stats().free, 3);
}

#[test]
fn test_cow_out_of_memory_keeps_reference() {
    let arena = TestArena::new(1);
    let alloc = arena.booted();
    let page = alloc.alloc_page().unwrap();
    alloc.add_reference(page);

    assert_eq!(cow_break(&alloc, page), Err(MmError::NoMemory));
    assert_eq!(alloc.ref_count(page), 2);
}

#[test]
fn test_cow_rejects_untracked_page() {
    let arena = TestArena::new(1);
    let alloc = arena.booted();
    assert!(matches!(
        cow_break(&alloc, arena.page(1)),
        Err(MmError::OutOfRange { .. })
    ));
}
