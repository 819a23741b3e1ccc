//! Scout demo: a sealed domain runs a perception lane that turns sensor
//! events into percepts, a memory lane that embeds percepts into the
//! `working` space, and an attention lane that samples what was stored.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use msi_host::vector::encode_f32_le;
use msi_host::{
    AssocQuery, AssocValue, DomainManifest, EnergyBudget, EventMeta, Grant, LaneId, LanePolicy,
    Perms, Priority, QoS, Substrate, SubstrateStats, bootstrap_substrate,
    load_manifest_from_path,
};
use tracing::{info, warn};

use crate::HelloArgs;

const SENSORS: [&str; 5] = ["camera", "gyro", "accel", "audio", "touch"];
const EMBEDDING_DIM: usize = 128;
const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct HelloReport {
    pub percepts: usize,
    pub memories: usize,
    pub recalls: usize,
    pub stats: SubstrateStats,
}

impl fmt::Display for HelloReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "percepts={} memories={} recalls={} lanes_active={} dropped={}",
            self.percepts,
            self.memories,
            self.recalls,
            self.stats.lanes_active,
            self.stats.events_dropped
        )
    }
}

pub fn scout_manifest() -> DomainManifest {
    DomainManifest::new("Scout")
        .grant(Grant::events("sensor/"))
        .grant(Grant::events("percept/"))
        .grant(Grant::events("attention/"))
        .grant(Grant::assoc("working", Perms::RW))
        .grant(Grant::Clock)
        .sealed()
}

/// Hash-derived stand-in for a real embedding model: 128 floats in [0, 1).
pub fn simple_embedding(data: &[u8]) -> Vec<f32> {
    (0..EMBEDDING_DIM)
        .map(|i| {
            let hash = data.iter().enumerate().fold(0i32, |hash, (j, b)| {
                hash.wrapping_mul(31)
                    .wrapping_add(i32::from(*b as i8))
                    .wrapping_add(i as i32)
                    .wrapping_add(j as i32)
            });
            (hash % 1000).unsigned_abs() as f32 / 1000.0
        })
        .collect()
}

#[derive(Default)]
struct Counters {
    percepts: AtomicUsize,
    memories: AtomicUsize,
    recalls: AtomicUsize,
}

pub async fn run(msi: &Substrate, args: &HelloArgs) -> Result<HelloReport> {
    let caps = bootstrap_substrate(msi).await?;
    println!(
        "[BOOT] substrate v{} lanes {}-{}",
        msi.version(),
        caps.lanes.min,
        caps.lanes.max.map_or("inf".to_string(), |m| m.to_string())
    );

    let manifest = match &args.manifest {
        Some(path) => load_manifest_from_path(path)
            .with_context(|| format!("load manifest {}", path.display()))?,
        None => scout_manifest(),
    };
    let domain = msi.domain_create(&manifest);
    println!("[DOMAIN] {} -> {domain}", manifest.name);

    let counters = Arc::new(Counters::default());
    register_lanes(msi, args.events, args.interval_ms, counters.clone());

    let lanes: Vec<LaneId> = [
        (
            "perception",
            LanePolicy {
                priority: Priority::High,
                energy_budget: EnergyBudget::Balanced,
                ..LanePolicy::default()
            },
        ),
        (
            "memory-weave",
            LanePolicy {
                energy_budget: EnergyBudget::Low,
                ..LanePolicy::default()
            },
        ),
        ("attention", LanePolicy::default()),
    ]
    .into_iter()
    .map(|(name, policy)| {
        msi.lane_spawn(Some(&domain), name, policy)
            .with_context(|| format!("spawn {name}"))
    })
    .collect::<Result<_>>()?;
    println!("[SPAWN] {} lanes", lanes.len());

    // Both subscribing lanes must be listening before the feed starts.
    let deadline = tokio::time::Instant::now() + WAIT;
    while msi.stats().event_subscriptions < 2 {
        ensure!(
            tokio::time::Instant::now() < deadline,
            "lanes never subscribed"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for i in 0..args.events {
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        let sensor = SENSORS[i % SENSORS.len()];
        let payload = format!("data_{i}_from_{sensor}");
        msi.event_publish(
            None,
            &format!("sensor/{sensor}"),
            payload.clone(),
            QoS::BestEffort,
            EventMeta::new(),
        )?;
        println!("[SENSOR] sensor/{sensor} -> {payload}");
    }

    let deadline = tokio::time::Instant::now() + WAIT * 3;
    while lanes.iter().any(|lane| msi.lane_is_alive(lane)) {
        if tokio::time::Instant::now() >= deadline {
            warn!("lanes still running at deadline; killing");
            lanes.iter().for_each(|lane| msi.lane_kill(lane));
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for lane in &lanes {
        info!(lane = %lane, state = ?msi.lane_state(lane), "lane outcome");
    }

    let stats = msi.stats();
    println!("[STATS] {}", serde_json::to_string(&stats)?);
    msi.shutdown();
    println!("[SHUTDOWN] substrate stopped");

    Ok(HelloReport {
        percepts: counters.percepts.load(Ordering::SeqCst),
        memories: counters.memories.load(Ordering::SeqCst),
        recalls: counters.recalls.load(Ordering::SeqCst),
        stats,
    })
}

fn register_lanes(msi: &Substrate, events: usize, interval_ms: u64, counters: Arc<Counters>) {
    let seen = counters.clone();
    msi.register_entrypoint("perception", move |ctx| {
        let seen = seen.clone();
        async move {
            let sub = ctx.subscribe("sensor/", None)?;
            for _ in 0..events {
                let Some(event) = ctx.wait(&sub, Some(WAIT)).await? else {
                    warn!(lane = %ctx.lane_id(), "timed out waiting for sensor event");
                    break;
                };
                let mut meta = EventMeta::new();
                meta.insert("source".into(), event.topic.clone());
                meta.insert("ts".into(), ctx.now_nanos().to_string());
                let mut percept = b"PERCEPT:".to_vec();
                percept.extend_from_slice(&event.payload);
                ctx.publish("percept/frame", percept, meta)?;
                seen.percepts.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    });

    let stored = counters.clone();
    msi.register_entrypoint("memory-weave", move |ctx| {
        let stored = stored.clone();
        async move {
            let sub = ctx.subscribe("percept/", None)?;
            for _ in 0..events {
                let Some(event) = ctx.wait(&sub, Some(WAIT)).await? else {
                    break;
                };
                let key = format!("mem_{}", ctx.now_nanos());
                let value = AssocValue::new(encode_f32_le(&simple_embedding(&event.payload)))
                    .with_meta(
                        "source",
                        event.meta.get("source").map_or("unknown", String::as_str),
                    )
                    .with_meta("content", String::from_utf8_lossy(&event.payload));
                ctx.assoc_put("working", &key, value)?;
                stored.memories.fetch_add(1, Ordering::SeqCst);
                println!("[MEMORY] stored {key}");
            }
            Ok(())
        }
    });

    let recalled = counters;
    msi.register_entrypoint("attention", move |ctx| {
        let recalled = recalled.clone();
        async move {
            for round in 1..=3 {
                ctx.sleep(Duration::from_millis(interval_ms * events.max(1) as u64 / 3))
                    .await;
                let results = ctx.assoc_query("working", &AssocQuery::top(3))?;
                println!("[ATTENTION] round {round}: {} memories", results.len());
                for result in &results {
                    let content = result
                        .value
                        .as_ref()
                        .and_then(|v| v.meta.get("content"))
                        .map_or("?", String::as_str);
                    println!("  {}: {content}", result.key);
                }
                recalled.recalls.fetch_add(results.len(), Ordering::SeqCst);
            }
            Ok(())
        }
    });
}
