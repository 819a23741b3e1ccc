//! Addressable and associative state through the façade.

use std::time::Duration;

use msi_host::vector::encode_f32_le;
use msi_host::{
    AssocQuery, AssocValue, DomainManifest, Grant, LanePolicy, LaneState, Perms, StoreError,
    SubstrateConfig, SubstrateError,
};

#[path = "helpers.rs"]
mod helpers;

use helpers::{scout_domain, substrate, substrate_with, wait_for_lane};

#[tokio::test]
async fn region_round_trip_and_bounds() {
    let msi = substrate();
    let domain = msi.domain_create(
        &DomainManifest::new("writer").grant(Grant::state("frame", Perms::RW)),
    );
    let handle = msi.state_map(Some(&domain), "frame", 8, Perms::RW).unwrap();

    msi.state_write(Some(&domain), &handle, 2, b"abc").unwrap();
    assert!(msi.state_is_dirty(&handle));
    assert_eq!(msi.state_read(Some(&domain), &handle, 2, 3).unwrap(), b"abc");
    msi.state_commit(Some(&domain), &handle).unwrap();
    assert!(!msi.state_is_dirty(&handle));

    let err = msi.state_write(Some(&domain), &handle, 6, b"xyz").unwrap_err();
    assert!(matches!(
        err,
        SubstrateError::Store(StoreError::OutOfBounds { offset: 6, len: 3, size: 8 })
    ));
    assert_eq!(msi.state_read(None, &handle, 0, 8).unwrap(), b"\0\0abc\0\0\0");

    msi.state_unmap(Some(&domain), &handle).unwrap();
    assert!(matches!(
        msi.state_read(None, &handle, 0, 1),
        Err(SubstrateError::Store(StoreError::UnknownHandle(_)))
    ));
}

#[tokio::test]
async fn read_only_regions_and_size_limits() {
    let msi = substrate_with(SubstrateConfig {
        max_state_bytes: Some(64),
        ..SubstrateConfig::default()
    });
    let handle = msi.state_map(None, "calib", 4, Perms::R).unwrap();
    assert!(matches!(
        msi.state_write(None, &handle, 0, b"x"),
        Err(SubstrateError::Store(StoreError::PermissionDenied { .. }))
    ));
    assert!(matches!(
        msi.state_map(None, "huge", 65, Perms::RW),
        Err(SubstrateError::Store(StoreError::RegionTooLarge { size: 65, max: 64 }))
    ));
    assert!(matches!(
        msi.state_map(None, "empty", 0, Perms::RW),
        Err(SubstrateError::Store(StoreError::InvalidSize(0)))
    ));

    let domain = msi.domain_create(&DomainManifest::new("nobody"));
    assert!(matches!(
        msi.state_map(Some(&domain), "calib", 4, Perms::R),
        Err(SubstrateError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn vector_query_ranks_by_cosine() {
    let msi = substrate();
    let domain = scout_domain(&msi);
    let put = |key: &str, v: &[f32]| {
        msi.assoc_put(Some(&domain), "working", key, AssocValue::new(encode_f32_le(v)))
            .unwrap();
    };
    put("same", &[1.0, 0.0]);
    put("close", &[1.0, 1.0]);
    put("far", &[0.0, 1.0]);
    msi.assoc_put(Some(&domain), "working", "odd", AssocValue::new(vec![1u8, 2, 3]))
        .unwrap();

    let results = msi
        .assoc_query(Some(&domain), "working", &AssocQuery::vector(2, vec![2.0, 0.0]))
        .unwrap();
    let keys: Vec<_> = results.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, ["same", "close"]);
    assert!((results[0].score.unwrap() - 1.0).abs() < 1e-6);
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn forget_policies_apply_through_the_facade() {
    let msi = substrate();
    for (key, ts) in [("a", 30u64), ("b", 10), ("c", 20)] {
        msi.assoc_put(None, "episodic", key, AssocValue::new(vec![0u8]).with_ts(ts))
            .unwrap();
    }
    msi.assoc_forget(None, "episodic", "oldest:2").unwrap();
    assert!(msi.assoc_get(None, "episodic", "a").unwrap().is_some());
    assert!(msi.assoc_get(None, "episodic", "b").unwrap().is_none());
    assert!(msi.assoc_get(None, "episodic", "c").unwrap().is_none());

    msi.assoc_forget(None, "episodic", "all").unwrap();
    assert!(msi.assoc_query(None, "episodic", &AssocQuery::top(10)).unwrap().is_empty());
    msi.assoc_forget(None, "nowhere", "missing").unwrap();
}

#[tokio::test]
async fn read_grants_do_not_allow_writes() {
    let msi = substrate();
    let domain = msi.domain_create(
        &DomainManifest::new("observer").grant(Grant::assoc("working", Perms::R)),
    );
    msi.assoc_put(None, "working", "k", AssocValue::new(vec![1u8]).with_meta("kind", "frame"))
        .unwrap();

    let hits = msi
        .assoc_query(Some(&domain), "working", &AssocQuery::predicate(5, "kind=frame"))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(matches!(
        msi.assoc_put(Some(&domain), "working", "k2", AssocValue::new(vec![2u8])),
        Err(SubstrateError::PermissionDenied { .. })
    ));
    assert!(msi.assoc_forget(Some(&domain), "working", "all").is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lanes_share_a_region_without_tearing() {
    let msi = substrate();
    let handle = msi.state_map(None, "counter", 64, Perms::RW).unwrap();
    let lanes: Vec<_> = (0..4u8)
        .map(|n| {
            let handle = handle.clone();
            let name = format!("writer-{n}");
            msi.register_entrypoint(name.clone(), move |ctx| {
                let handle = handle.clone();
                async move {
                    for _ in 0..50 {
                        ctx.state_write(&handle, 0, &[n; 64])?;
                        let seen = ctx.state_read(&handle, 0, 64)?;
                        anyhow::ensure!(seen.iter().all(|b| *b == seen[0]), "torn read");
                        ctx.sleep(Duration::from_micros(50)).await;
                    }
                    Ok(())
                }
            });
            msi.lane_spawn(None, &name, LanePolicy::default()).unwrap()
        })
        .collect();

    for lane in &lanes {
        assert!(wait_for_lane(&msi, lane, LaneState::Completed).await);
    }
}
