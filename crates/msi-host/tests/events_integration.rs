//! Event routing through the façade, with and without lanes.

use std::time::Duration;

use msi_host::{
    DomainManifest, EventMeta, Grant, LaneId, LanePolicy, LaneState, QoS, SubstrateConfig,
    SubstrateError,
};

#[path = "helpers.rs"]
mod helpers;

use helpers::{poll, scout_domain, substrate, substrate_with, wait_for_lane};

const WAIT: Option<Duration> = Some(Duration::from_millis(500));

#[tokio::test]
async fn host_publish_reaches_domain_subscription() {
    let msi = substrate();
    let domain = msi.domain_create(&DomainManifest::new("d").grant(Grant::events("percept/")));
    let sub = msi.event_subscribe(Some(&domain), "percept/", None).unwrap();

    msi.event_publish(None, "other/topic", b"y".to_vec(), QoS::BestEffort, EventMeta::new())
        .unwrap();
    let id = msi
        .event_publish(None, "percept/frame", b"x".to_vec(), QoS::BestEffort, EventMeta::new())
        .unwrap();

    let event = msi
        .event_wait(Some(&domain), &sub, WAIT)
        .await
        .unwrap()
        .expect("event delivered");
    assert_eq!(event.id, id);
    assert_eq!(event.topic, "percept/frame");
    assert_eq!(event.payload, b"x");

    let next = msi
        .event_wait(Some(&domain), &sub, Some(Duration::from_millis(20)))
        .await
        .unwrap();
    assert!(next.is_none(), "other/topic must not be delivered");
}

#[tokio::test]
async fn prefix_matching_is_literal() {
    let msi = substrate();
    let slash = msi.event_subscribe(None, "sensor/", None).unwrap();
    let gyro = msi.event_subscribe(None, "sensor/gyro", None).unwrap();

    msi.event_publish(None, "sensor", b"".to_vec(), QoS::BestEffort, EventMeta::new())
        .unwrap();
    msi.event_publish(None, "sensor/camera", b"".to_vec(), QoS::BestEffort, EventMeta::new())
        .unwrap();

    let first = msi.event_wait(None, &slash, WAIT).await.unwrap().unwrap();
    assert_eq!(first.topic, "sensor/camera");
    let short = Some(Duration::from_millis(20));
    assert!(msi.event_wait(None, &slash, short).await.unwrap().is_none());
    assert!(msi.event_wait(None, &gyro, short).await.unwrap().is_none());
}

#[tokio::test]
async fn meta_filter_and_fifo_order() {
    let msi = substrate();
    let sub = msi.event_subscribe(None, "percept/", Some("source=camera")).unwrap();
    for (i, source) in ["camera", "gyro", "camera"].iter().enumerate() {
        let mut meta = EventMeta::new();
        meta.insert("source".into(), source.to_string());
        msi.event_publish(None, "percept/frame", vec![i as u8], QoS::AtLeastOnce, meta)
            .unwrap();
    }
    let a = msi.event_wait(None, &sub, WAIT).await.unwrap().unwrap();
    let b = msi.event_wait(None, &sub, WAIT).await.unwrap().unwrap();
    assert_eq!((a.payload, b.payload), (vec![0], vec![2]));
}

#[tokio::test]
async fn denied_topics_name_domain_and_resource() {
    let msi = substrate();
    let domain = msi.domain_create(&DomainManifest::new("d").grant(Grant::events("percept/")));

    let err = msi.event_subscribe(Some(&domain), "sensor/", None).unwrap_err();
    match err {
        SubstrateError::PermissionDenied { domain: d, resource } => {
            assert_eq!(d, domain);
            assert_eq!(resource, "events:sensor/");
        }
        other => panic!("unexpected error: {other}"),
    }

    let sub = msi.event_subscribe(None, "sensor/", None).unwrap();
    assert!(matches!(
        msi.event_wait(Some(&domain), &sub, WAIT).await,
        Err(SubstrateError::PermissionDenied { .. })
    ));

    let stranger = msi_host::DomainId::generate();
    assert!(msi.event_subscribe(Some(&stranger), "percept/", None).is_err());
}

#[tokio::test]
async fn full_queues_drop_and_count() {
    let msi = substrate_with(SubstrateConfig {
        event_queue_capacity: 2,
        ..SubstrateConfig::default()
    });
    let sub = msi.event_subscribe(None, "t/", None).unwrap();
    for i in 0..5u8 {
        msi.event_publish(None, "t/x", vec![i], QoS::BestEffort, EventMeta::new())
            .unwrap();
    }
    assert_eq!(msi.stats().events_dropped, 3);
    let first = msi.event_wait(None, &sub, WAIT).await.unwrap().unwrap();
    assert_eq!(first.payload, vec![0]);
}

#[tokio::test]
async fn unsubscribed_and_unknown_subscriptions_end_waits() {
    let msi = substrate();
    let sub = msi.event_subscribe(None, "t/", None).unwrap();
    msi.event_publish(None, "t/x", b"a".to_vec(), QoS::BestEffort, EventMeta::new())
        .unwrap();
    assert!(msi.event_unsubscribe(None, &sub).unwrap());
    assert!(!msi.event_unsubscribe(None, &sub).unwrap());

    assert!(msi.event_wait(None, &sub, None).await.unwrap().is_none());
    let unknown = msi_host::SubId::generate();
    assert!(msi.event_wait(None, &unknown, None).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lane_republishes_sensor_events() {
    let msi = substrate();
    let domain = scout_domain(&msi);
    let percepts = msi.event_subscribe(None, "percept/", None).unwrap();

    msi.register_entrypoint("perception", |ctx| async move {
        let sub = ctx.subscribe("sensor/", None)?;
        while let Some(event) = ctx.wait(&sub, None).await? {
            let mut meta = EventMeta::new();
            meta.insert("source".into(), event.topic.clone());
            ctx.publish("percept/frame", event.payload, meta)?;
        }
        Ok(())
    });
    let lane: LaneId = msi
        .lane_spawn(Some(&domain), "perception", LanePolicy::default())
        .unwrap();

    assert!(poll(|| msi.stats().event_subscriptions == 2).await);
    msi.event_publish(None, "sensor/camera", b"img".to_vec(), QoS::BestEffort, EventMeta::new())
        .unwrap();

    let percept = msi.event_wait(None, &percepts, Some(Duration::from_secs(2))).await.unwrap().unwrap();
    assert_eq!(percept.topic, "percept/frame");
    assert_eq!(percept.payload, b"img");
    assert_eq!(percept.meta.get("source").map(String::as_str), Some("sensor/camera"));

    msi.lane_kill(&lane);
    assert!(wait_for_lane(&msi, &lane, LaneState::Killed).await);
}
