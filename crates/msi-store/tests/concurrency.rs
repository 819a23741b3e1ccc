//! Store consistency under concurrent writers.

use std::sync::Arc;

use msi_store::vector::encode_f32_le;
use msi_store::{AssocStore, StateStore};
use msi_types::{AssocQuery, AssocValue, Perms};

#[test]
fn region_writes_are_never_torn() {
    let store = Arc::new(StateStore::new());
    let handle = store.map("frame", 256, Perms::RW).unwrap();

    let threads: Vec<_> = (1..=4u8)
        .map(|n| {
            let store = store.clone();
            let handle = handle.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    store.write(&handle, 0, &[n; 256]).unwrap();
                    let seen = store.read(&handle, 0, 256).unwrap();
                    assert!(seen.iter().all(|b| *b == seen[0]));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    let last = store.read(&handle, 0, 256).unwrap();
    assert!((1..=4).contains(&last[0]));
}

#[test]
fn concurrent_puts_land_in_their_spaces() {
    let store = Arc::new(AssocStore::new());
    let threads: Vec<_> = (0..4)
        .map(|n| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..50u32 {
                    let v = encode_f32_le(&[i as f32, 1.0]);
                    store.put(&format!("space-{}", n % 2), format!("{n}-{i}"), AssocValue::new(v));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(store.space_count(), 2);
    assert_eq!(store.space_size("space-0"), 100);
    assert_eq!(store.space_size("space-1"), 100);
    let hits = store.query("space-0", &AssocQuery::vector(3, vec![0.0, 1.0]));
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}
