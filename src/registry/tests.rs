//! Registry tests - record table bookkeeping, isolation and diagnostics

use super::*;
use crate::handle::Handle;

fn scalar_registry<T: Send + Sync + 'static>() -> Arc<Registry<T>> {
    Registry::builder().without_exit_hook().build()
}

fn array_registry<T: Send + Sync + 'static>(len: usize) -> Arc<Registry<T>> {
    Registry::builder().declared_len(len).without_exit_hook().build()
}

#[cfg(test)]
mod table_tests {
    use super::*;

    #[test]
    fn test_insert_then_find() {
        let mut value = 7u32;
        let ptr: *mut u32 = &mut value;
        let mut table = RecordTable::new();

        let record = table.insert(ptr, 0).unwrap();
        assert_eq!(record.refcount, 1);
        assert!(!record.is_array());

        let found = table.find(ptr as usize).expect("record present");
        assert_eq!(found.ptr, ptr);
        assert!(table.find(ptr as usize + 4).is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut value = 1u8;
        let ptr: *mut u8 = &mut value;
        let mut table = RecordTable::new();

        table.insert(ptr, 0).unwrap();
        assert_eq!(
            table.insert(ptr, 0).err(),
            Some(RegistryError::DuplicateAddress {
                address: ptr as usize
            })
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_acquire_resolves_existing_record() {
        let mut value = 0i32;
        let ptr: *mut i32 = &mut value;
        let mut table = RecordTable::new();

        assert_eq!(table.acquire(ptr, 0), Ok(1));
        assert_eq!(table.acquire(ptr, 0), Ok(2));
        assert_eq!(table.acquire(ptr, 0), Ok(3));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unregistered_address_is_an_error() {
        let mut table: RecordTable<u64> = RecordTable::new();

        assert_eq!(
            table.retain(0x40),
            Err(RegistryError::UnregisteredAddress { address: 0x40 })
        );
        assert_eq!(
            table.release(0x40),
            Err(RegistryError::UnregisteredAddress { address: 0x40 })
        );
    }

    #[test]
    fn test_release_saturates_with_underflow_error() {
        let mut value = 0u16;
        let ptr: *mut u16 = &mut value;
        let mut table = RecordTable::new();

        table.acquire(ptr, 0).unwrap();
        assert_eq!(table.release(ptr as usize), Ok(0));
        assert_eq!(
            table.release(ptr as usize),
            Err(RegistryError::RefcountUnderflow {
                address: ptr as usize
            })
        );
        assert_eq!(table.find(ptr as usize).map(|r| r.refcount), Some(0));
    }

    #[test]
    fn test_drain_only_takes_zero_counts() {
        let mut values = [0u32; 3];
        let base = values.as_mut_ptr();
        let mut table = RecordTable::new();

        for i in 0..3 {
            table.acquire(base.wrapping_add(i), 0).unwrap();
        }
        table.release(base as usize).unwrap();
        table.release(base.wrapping_add(2) as usize).unwrap();

        let drained = table.drain_collectible();
        let mut addresses: Vec<usize> = drained.iter().map(|r| r.address()).collect();
        addresses.sort_unstable();

        assert_eq!(addresses, vec![base as usize, base.wrapping_add(2) as usize]);
        assert_eq!(table.len(), 1);
        assert!(table.find(base.wrapping_add(1) as usize).is_some());
    }

    #[test]
    fn test_newest_record_listed_first() {
        let mut values = [0u8; 4];
        let base = values.as_mut_ptr();
        let mut table = RecordTable::new();

        for i in 0..4 {
            table.acquire(base.wrapping_add(i), 0).unwrap();
        }

        let order: Vec<usize> = table.infos().iter().map(|info| info.address).collect();
        let expected: Vec<usize> = (0..4).rev().map(|i| base.wrapping_add(i) as usize).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_zero_all_marks_everything_collectible() {
        let mut values = [0u8; 2];
        let base = values.as_mut_ptr();
        let mut table = RecordTable::new();

        table.acquire(base, 0).unwrap();
        table.acquire(base, 0).unwrap();
        table.acquire(base.wrapping_add(1), 0).unwrap();
        table.zero_all();

        assert_eq!(table.drain_collectible().len(), 2);
        assert!(table.is_empty());
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn test_new_handle_creates_record() {
        let registry = scalar_registry::<u32>();
        let handle = Handle::new(&registry, 11).unwrap();

        let info = registry.find(handle.as_ptr()).expect("tracked");
        assert_eq!(info.refcount, 1);
        assert!(!info.is_array);
        assert_eq!(info.len, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registries_isolated_by_declared_length() {
        let three = array_registry::<i32>(3);
        let five = array_registry::<i32>(5);

        let a = Handle::from_vec(&three, vec![1, 2, 3]).unwrap();
        let a2 = a.clone();
        let b = Handle::from_vec(&five, vec![1, 2, 3, 4, 5]).unwrap();

        assert_eq!(three.refcount(a.as_ptr()), Some(2));
        assert_eq!(five.refcount(b.as_ptr()), Some(1));

        // Neither registry sees the other's allocation
        assert!(!three.contains(b.as_ptr()));
        assert!(!five.contains(a.as_ptr()));
        assert_eq!(three.len(), 1);
        assert_eq!(five.len(), 1);

        drop(a2);
        assert_eq!(three.refcount(a.as_ptr()), Some(1));
        assert_eq!(five.refcount(b.as_ptr()), Some(1));
    }

    #[test]
    fn test_collect_cycle_knob() {
        let registry: Arc<Registry<u8>> = Registry::builder()
            .collect_cycle(4)
            .without_exit_hook()
            .build();
        assert_eq!(registry.collect_cycle(), 4);

        registry.set_collect_cycle(0);
        assert_eq!(registry.collect_cycle(), 0);
    }

    #[test]
    fn test_with_config() {
        let registry: Arc<Registry<u64>> =
            Registry::with_config(GcConfig::array(6).with_collect_cycle(2).without_exit_hook());
        assert_eq!(registry.declared_len(), 6);
        assert_eq!(registry.collect_cycle(), 2);
    }

    #[test]
    fn test_convenience_constructors_read_environment() {
        let expected = GcConfig::from_env();

        let scalar = Registry::<u8>::new();
        assert_eq!(scalar.collect_cycle(), expected.collect_cycle);
        assert_eq!(scalar.declared_len(), 0);

        let array = Registry::<u8>::array(4);
        assert_eq!(array.collect_cycle(), expected.collect_cycle);
        assert_eq!(array.declared_len(), 4);
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let a = scalar_registry::<u8>();
        let b = scalar_registry::<u8>();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_dropping_registry_reclaims_pending_records() {
        let registry: Arc<Registry<String>> = Registry::builder()
            .collect_cycle(10)
            .without_exit_hook()
            .build();

        drop(Handle::new(&registry, "a".to_string()).unwrap());
        drop(Handle::new(&registry, "b".to_string()).unwrap());
        assert_eq!(registry.len(), 2);

        // Swept by Drop; nothing leaks under the throttle
        drop(registry);
    }
}

#[cfg(test)]
mod dump_tests {
    use super::*;

    #[test]
    fn test_dump_empty_registry() {
        let registry = scalar_registry::<i32>();
        let dump = registry.dump();

        let expected = "Registry<i32, 0>;\n\
                        raw_pointer       ref_count     value\n           -- Empty --\n\n";
        assert_eq!(dump, expected);
    }

    #[test]
    fn test_dump_lists_records_newest_first() {
        let registry = scalar_registry::<i32>();
        let first = Handle::new(&registry, 42).unwrap();
        let second = Handle::new(&registry, -7).unwrap();
        let _copy = second.clone();

        let dump = registry.dump();
        let lines: Vec<&str> = dump.lines().collect();

        assert_eq!(lines[0], "Registry<i32, 0>;");
        assert_eq!(lines[1], "raw_pointer       ref_count     value");
        assert_eq!(lines[2], format!("[{:p}]       2      -7", second.as_ptr()));
        assert_eq!(lines[3], format!("[{:p}]       1      42", first.as_ptr()));
        assert_eq!(lines[4], "");
    }

    #[test]
    fn test_dump_null_and_array_rows() {
        let registry = array_registry::<u8>(3);
        let values = Handle::from_vec(&registry, vec![1, 2, 3]).unwrap();
        let null = Handle::null(&registry).unwrap();

        let dump = registry.dump();
        assert!(dump.starts_with("Registry<u8, 3>;\n"));
        assert!(dump.contains(&format!("[{:p}]       1      ---", null.as_ptr())));
        assert!(dump.contains(&format!("[{:p}]       1      [1, 2, 3]", values.as_ptr())));
    }

    #[test]
    fn test_records_snapshot() {
        let registry = scalar_registry::<char>();
        let a = Handle::new(&registry, 'a').unwrap();
        let b = Handle::new(&registry, 'b').unwrap();
        let _b2 = b.clone();

        let records = registry.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].address, b.as_ptr() as usize);
        assert_eq!(records[0].refcount, 2);
        assert_eq!(records[1].address, a.as_ptr() as usize);
        assert_eq!(records[1].refcount, 1);
    }

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Node {
        value: u32,
        next: Option<Handle<Node>>,
    }

    #[test]
    fn test_dump_of_linked_nodes_returns() {
        let registry = scalar_registry::<Node>();
        let tail = Handle::new(&registry, Node { value: 2, next: None }).unwrap();
        let head = Handle::new(
            &registry,
            Node {
                value: 1,
                next: Some(tail.clone()),
            },
        )
        .unwrap();

        let dump = registry.dump();
        assert!(dump.contains("value: 1"));
        assert!(dump.contains("value: 2"));
        assert!(dump.contains("refcount: <locked>"));

        // Outside a dump the count is visible again
        assert!(format!("{:?}", tail).contains("refcount: Some(2)"));
        drop(head);
        assert!(format!("{:?}", tail).contains("refcount: Some(1)"));
    }

    #[test]
    fn test_registry_debug_while_locked() {
        let registry = scalar_registry::<u8>();
        let unlocked = format!("{:?}", registry);
        assert!(unlocked.contains("records: 0"));

        let _guard = registry.state.lock();
        let locked = format!("{:?}", registry);
        assert!(locked.ends_with(", .. }"));
        assert!(!locked.contains("records"));
    }
}
