mod common;

use common::{ByteObjects, HandleArrays, Respawning, alloc_ref, manager};
use mo_runtime::{Handle, ManagedObjectPool, NativeAddress, ObjectKind, PoolConfig, PoolError};
use proptest::prelude::*;

#[test]
fn handles_start_at_one() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (first, _) = alloc_ref(&mut pool, &objects);
    let (second, _) = alloc_ref(&mut pool, &objects);
    assert_eq!(first, Handle(1));
    assert_eq!(second, Handle(2));
    assert_eq!(pool.next_handle(), Handle(3));
}

#[test]
fn new_objects_start_unreferenced() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let address = objects.create();
    let handle = pool.allocate(address, manager(&objects), ObjectKind::Plain);
    assert_eq!(pool.ref_count(handle), Some(0));
    assert_eq!(pool.handle_to_address(handle), Some(address));
    assert_eq!(pool.address_to_handle(address), handle);
    let object = pool.handle_to_object(handle).unwrap();
    assert_eq!(object.kind, ObjectKind::Plain);
    assert_eq!(object.manager.type_name(), "Thing");
}

#[test]
fn stale_handles_are_soft() {
    let mut pool = ManagedObjectPool::new();
    for handle in [Handle(0), Handle(-3), Handle(1), Handle(999_999)] {
        assert_eq!(pool.add_ref(handle), 0);
        assert_eq!(pool.sub_ref(handle), 0);
        assert!(pool.check_dispose(handle));
        assert!(!pool.is_valid(handle));
        assert_eq!(pool.handle_to_address(handle), None);
        assert_eq!(pool.ref_count(handle), None);
    }
    assert_eq!(pool.address_to_handle(NativeAddress::NULL), Handle::NULL);
    assert_eq!(pool.address_to_handle(NativeAddress(0x1234)), Handle::NULL);
}

#[test]
fn releasing_last_reference_invalidates_handle() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (handle, address) = alloc_ref(&mut pool, &objects);
    assert_eq!(pool.add_ref(handle), 2);
    assert_eq!(pool.sub_ref(handle), 1);
    assert!(pool.is_valid(handle));
    assert_eq!(pool.sub_ref(handle), 0);
    assert!(!pool.is_valid(handle));
    assert_eq!(pool.handle_to_address(handle), None);
    assert_eq!(pool.add_ref(handle), 0);
    assert!(objects.was_disposed(address));
}

#[test]
fn recycled_handle_does_not_answer_for_old_address() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let mut addresses = Vec::new();
    for _ in 0..5 {
        addresses.push(alloc_ref(&mut pool, &objects));
    }
    let (fifth, old_address) = addresses[4];
    assert_eq!(fifth, Handle(5));
    pool.sub_ref(fifth);

    let (reused, new_address) = alloc_ref(&mut pool, &objects);
    assert_eq!(reused, Handle(5));
    assert_eq!(pool.address_to_handle(old_address), Handle::NULL);
    assert_eq!(pool.address_to_handle(new_address), Handle(5));
}

#[test]
fn freed_handles_are_reused_first_in_first_out() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let handles: Vec<Handle> = (0..4).map(|_| alloc_ref(&mut pool, &objects).0).collect();
    pool.sub_ref(handles[2]);
    pool.sub_ref(handles[0]);
    assert_eq!(alloc_ref(&mut pool, &objects).0, handles[2]);
    assert_eq!(alloc_ref(&mut pool, &objects).0, handles[0]);
    assert_eq!(alloc_ref(&mut pool, &objects).0, Handle(5));
}

#[test]
fn object_ref_goes_stale_when_slot_is_reused() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (handle, address) = alloc_ref(&mut pool, &objects);
    let old = pool.object_ref(handle).unwrap();
    assert_eq!(pool.resolve(old).map(|o| o.address), Some(address));

    pool.sub_ref(handle);
    let (reused, _) = alloc_ref(&mut pool, &objects);
    assert_eq!(reused, handle);
    assert!(pool.resolve(old).is_none());
    let fresh = pool.object_ref(reused).unwrap();
    assert_ne!(fresh, old);
    assert!(pool.resolve(fresh).is_some());
}

#[test]
fn check_dispose_only_takes_unreferenced_objects() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (held, _) = alloc_ref(&mut pool, &objects);
    let loose = pool.allocate(objects.create(), manager(&objects), ObjectKind::Dynamic);

    assert!(!pool.check_dispose(held));
    assert!(pool.is_valid(held));
    assert!(pool.check_dispose(loose));
    assert!(!pool.is_valid(loose));
}

#[test]
fn vetoed_disposal_keeps_object_until_forced() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (handle, address) = alloc_ref(&mut pool, &objects);
    objects.veto(address);

    assert_eq!(pool.sub_ref(handle), 0);
    assert!(pool.is_valid(handle));
    assert!(!pool.check_dispose(handle));
    assert_eq!(pool.run_gc(), 0);
    assert!(pool.is_valid(handle));

    assert!(pool.remove_by_address(address));
    assert!(!pool.is_valid(handle));
    assert!(objects.was_disposed(address));
    assert!(!pool.remove_by_address(address));
}

#[test]
fn remove_by_address_ignores_reference_count() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (handle, address) = alloc_ref(&mut pool, &objects);
    pool.add_ref(handle);
    assert!(pool.remove_by_address(address));
    assert!(!pool.is_valid(handle));
    assert_eq!(pool.address_to_handle(address), Handle::NULL);
}

#[test]
fn protected_address_survives_release_and_sweep() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (handle, address) = alloc_ref(&mut pool, &objects);

    let swept = pool.with_protected(address, |pool| {
        assert_eq!(pool.sub_ref(handle), 0);
        assert!(!pool.check_dispose(handle));
        pool.run_gc()
    });
    assert_eq!(swept, 0);
    assert!(pool.is_valid(handle));
    assert_eq!(pool.protected(), None);

    assert!(pool.check_dispose(handle));
    assert!(!pool.is_valid(handle));
}

#[test]
fn protect_returns_previous_address() {
    let mut pool = ManagedObjectPool::new();
    assert_eq!(pool.protect(Some(NativeAddress(8))), None);
    assert_eq!(pool.protect(Some(NativeAddress(16))), Some(NativeAddress(8)));
    assert_eq!(pool.protect(None), Some(NativeAddress(16)));
}

#[test]
fn gc_waits_for_the_allocation_threshold() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::with_config(PoolConfig {
        gc_interval: 4,
        ..PoolConfig::default()
    });
    let leaked: Vec<Handle> = (0..3)
        .map(|_| pool.allocate(objects.create(), manager(&objects), ObjectKind::Dynamic))
        .collect();
    assert!(!pool.run_gc_if_appropriate());
    assert!(leaked.iter().all(|h| pool.is_valid(*h)));

    let (kept, _) = alloc_ref(&mut pool, &objects);
    assert!(pool.run_gc_if_appropriate());
    assert!(leaked.iter().all(|h| !pool.is_valid(*h)));
    assert!(pool.is_valid(kept));

    // The counter starts over after a sweep.
    assert!(!pool.run_gc_if_appropriate());
}

#[test]
fn releasing_a_container_releases_its_elements() {
    let objects = ByteObjects::new("Thing", 8);
    let arrays = HandleArrays::new();
    let mut pool = ManagedObjectPool::new();
    let (a, a_address) = alloc_ref(&mut pool, &objects);
    let (b, b_address) = alloc_ref(&mut pool, &objects);
    pool.add_ref(b);

    let array = pool.allocate(arrays.create(vec![a, b]), manager(&arrays), ObjectKind::Dynamic);
    pool.add_ref(array);
    pool.sub_ref(array);

    assert!(!pool.is_valid(array));
    assert!(!pool.is_valid(a));
    assert!(objects.was_disposed(a_address));
    assert_eq!(pool.ref_count(b), Some(1));
    assert!(!objects.was_disposed(b_address));
}

#[test]
fn sweep_survives_table_growth_during_disposal() {
    let objects = ByteObjects::new("Thing", 8);
    let respawning = Respawning::new(objects.clone());
    let mut pool = ManagedObjectPool::with_config(PoolConfig {
        chunk_size: 1,
        ..PoolConfig::default()
    });
    let dying = pool.allocate(respawning.create(), manager(&respawning), ObjectKind::Pointer);
    let leaked = pool.allocate(objects.create(), manager(&objects), ObjectKind::Dynamic);

    // Disposing `dying` registers a referenced replacement at the next fresh handle while
    // the sweep is still running; `leaked` is swept after that.
    assert_eq!(pool.run_gc(), 2);
    let spawned = respawning.spawned.borrow();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].handle, Handle(3));
    assert_eq!(pool.handle_to_address(Handle(3)), Some(spawned[0].address));
    assert!(!pool.is_valid(dying));
    assert!(!pool.is_valid(leaked));
    assert_eq!(pool.live_handles().collect::<Vec<_>>(), vec![Handle(3)]);
}

#[test]
fn sweep_disposes_every_unreferenced_object_once() {
    let objects = ByteObjects::new("Thing", 8);
    let arrays = HandleArrays::new();
    let mut pool = ManagedObjectPool::new();
    let element = pool.allocate(objects.create(), manager(&objects), ObjectKind::Dynamic);
    pool.add_ref(element);
    let array = pool.allocate(arrays.create(vec![element]), manager(&arrays), ObjectKind::Dynamic);

    // The array is unreferenced; disposing it releases the element from inside the sweep.
    // Both count.
    assert_eq!(pool.run_gc(), 2);
    assert!(!pool.is_valid(array));
    assert!(!pool.is_valid(element));
    assert_eq!(objects.disposed.borrow().len(), 1);
    assert_eq!(pool.live_count(), 0);
}

#[test]
fn reset_forces_everything_out() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    let (_, vetoed) = alloc_ref(&mut pool, &objects);
    objects.veto(vetoed);
    alloc_ref(&mut pool, &objects);
    alloc_ref(&mut pool, &objects);

    pool.reset();
    assert_eq!(pool.live_count(), 0);
    assert!(objects.was_disposed(vetoed));
    assert_eq!(objects.disposed.borrow().len(), 3);
    assert_eq!(pool.next_handle(), Handle(1));
    assert_eq!(alloc_ref(&mut pool, &objects).0, Handle(1));
}

#[test]
fn reset_disposes_objects_registered_during_reset() {
    let objects = ByteObjects::new("Thing", 8);
    let respawning = Respawning::new(objects.clone());
    let mut pool = ManagedObjectPool::new();
    let (freed, _) = alloc_ref(&mut pool, &objects);
    let dying = pool.allocate(respawning.create(), manager(&respawning), ObjectKind::Pointer);
    pool.add_ref(dying);
    pool.sub_ref(freed);
    assert_eq!(objects.disposed.borrow().len(), 1);

    pool.reset();
    let spawned = respawning.spawned.borrow();
    assert_eq!(spawned.len(), 1);
    assert!(objects.was_disposed(spawned[0].address));
    assert_eq!(objects.disposed.borrow().len(), 2);
    assert_eq!(pool.live_count(), 0);
    assert_eq!(pool.address_to_handle(spawned[0].address), Handle::NULL);
    drop(spawned);

    // A fresh allocation after reset cannot land on a forgotten object.
    let (handle, _) = alloc_ref(&mut pool, &objects);
    assert_eq!(handle, Handle(1));
    assert_eq!(objects.disposed.borrow().len(), 2);
}

#[test]
fn explicit_handle_above_the_limit_is_rejected() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::with_config(PoolConfig {
        max_handles: 16,
        ..PoolConfig::default()
    });
    let err = pool
        .allocate_with_handle(objects.create(), manager(&objects), ObjectKind::Dynamic, Handle(17))
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidHandle(17)));
    assert_eq!(pool.next_handle(), Handle(1));
    pool.allocate_with_handle(objects.create(), manager(&objects), ObjectKind::Dynamic, Handle(16))
        .unwrap();
    assert_eq!(pool.next_handle(), Handle(17));
}

#[test]
fn explicit_handle_must_be_positive() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::new();
    for bad in [0, -1] {
        let err = pool
            .allocate_with_handle(objects.create(), manager(&objects), ObjectKind::Dynamic, Handle(bad))
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidHandle(h) if h == bad));
    }
}

#[test]
fn explicit_handle_is_never_handed_out_twice() {
    let objects = ByteObjects::new("Thing", 8);
    let mut pool = ManagedObjectPool::with_config(PoolConfig {
        chunk_size: 2,
        ..PoolConfig::default()
    });
    pool.allocate_with_handle(objects.create(), manager(&objects), ObjectKind::Dynamic, Handle(3))
        .unwrap();
    assert_eq!(pool.next_handle(), Handle(4));

    let fresh: Vec<Handle> = (0..3)
        .map(|_| pool.allocate(objects.create(), manager(&objects), ObjectKind::Dynamic))
        .collect();
    assert_eq!(fresh, vec![Handle(1), Handle(2), Handle(4)]);
}

#[test]
fn table_grows_past_one_chunk() {
    let objects = ByteObjects::new("Thing", 1);
    let mut pool = ManagedObjectPool::with_config(PoolConfig {
        chunk_size: 4,
        ..PoolConfig::default()
    });
    let handles: Vec<Handle> = (0..10).map(|_| alloc_ref(&mut pool, &objects).0).collect();
    assert_eq!(handles.last(), Some(&Handle(10)));
    assert_eq!(pool.live_count(), 10);
    assert_eq!(pool.live_handles().collect::<Vec<_>>(), handles);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    AddRef,
    SubRef,
}

proptest! {
    #[test]
    fn refcount_is_adds_minus_subs(ops in prop::collection::vec(prop_oneof![Just(Op::AddRef), Just(Op::SubRef)], 0..64)) {
        let objects = ByteObjects::new("Thing", 4);
        let mut pool = ManagedObjectPool::new();
        let (handle, _) = alloc_ref(&mut pool, &objects);
        // Extra references up front keep the object alive whatever the order.
        let adds = ops.iter().filter(|op| matches!(op, Op::AddRef)).count() as i32;
        let subs = ops.len() as i32 - adds;
        for _ in 0..subs {
            pool.add_ref(handle);
        }
        for op in &ops {
            match op {
                Op::AddRef => { pool.add_ref(handle); }
                Op::SubRef => { pool.sub_ref(handle); }
            }
        }
        prop_assert!(pool.is_valid(handle));
        prop_assert_eq!(pool.ref_count(handle), Some(1 + adds));
        prop_assert_eq!(pool.add_ref(handle), 2 + adds);
    }
}
