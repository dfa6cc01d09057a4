use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use broker_engine::{BrokerEngine, Delivery, ProducerRecord};

use crate::config::BenchArgs;
use crate::error::ServerError;

const TOPIC: &str = "bench";

#[derive(Debug, Serialize)]
struct BenchReport {
    partitions: u32,
    producers: usize,
    groups: usize,
    value_size: usize,
    records: u64,
    produce_secs: f64,
    produce_per_sec: f64,
    consumers: Vec<GroupReport>,
}

#[derive(Debug, Serialize)]
struct GroupReport {
    group: String,
    received: u64,
    out_of_order: u64,
    secs: f64,
    per_sec: f64,
}

pub async fn run(args: BenchArgs) -> Result<(), ServerError> {
    if args.producers == 0 || args.partitions == 0 {
        return Err(ServerError::Args(
            "--producers and --partitions must be at least 1".into(),
        ));
    }

    let engine = BrokerEngine::default();
    let ctx = CancellationToken::new();
    engine.create_topic(&ctx, TOPIC, args.partitions)?;

    let total = total_records(&args)?;
    tracing::info!(
        partitions = args.partitions,
        producers = args.producers,
        groups = args.groups,
        records = total,
        "bench starting"
    );

    let started = Instant::now();
    let mut consumers = Vec::with_capacity(args.groups);
    for i in 0..args.groups {
        let group = format!("bench-group-{i}");
        let sub = engine.consume(&ctx, TOPIC, &group)?;
        consumers.push(tokio::spawn(consume_all(sub, group, total, started)));
    }

    let value = Bytes::from(vec![b'x'; args.value_size]);
    let mut producers = Vec::with_capacity(args.producers);
    for p in 0..args.producers {
        let engine = engine.clone();
        let ctx = ctx.clone();
        let value = value.clone();
        let key = if args.keyed {
            Bytes::from(format!("producer-{p}"))
        } else {
            Bytes::new()
        };
        let records = args.records;
        producers.push(tokio::spawn(async move {
            for n in 0..records {
                engine.produce(&ctx, TOPIC, ProducerRecord::new(key.clone(), value.clone()))?;
                if n % 1024 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Ok::<_, broker_engine::BrokerError>(())
        }));
    }
    for handle in producers {
        handle.await??;
    }
    let produce_secs = started.elapsed().as_secs_f64();

    let mut group_reports = Vec::with_capacity(consumers.len());
    for handle in consumers {
        group_reports.push(handle.await??);
    }
    engine.shutdown();

    let report = BenchReport {
        partitions: args.partitions,
        producers: args.producers,
        groups: args.groups,
        value_size: args.value_size,
        records: total,
        produce_secs,
        produce_per_sec: rate(total, produce_secs),
        consumers: group_reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn consume_all(
    mut sub: broker_engine::Subscription,
    group: String,
    total: u64,
    started: Instant,
) -> Result<GroupReport, broker_engine::BrokerError> {
    let mut next_expected: HashMap<u32, u64> = HashMap::new();
    let mut received = 0;
    let mut out_of_order = 0;

    while received < total {
        match sub.next().await? {
            Delivery::Record(record) => {
                let expected = next_expected.entry(record.partition).or_insert(0);
                if record.offset != *expected {
                    out_of_order += 1;
                }
                *expected = record.offset + 1;
                received += 1;
            }
            Delivery::Finished(completion) => {
                tracing::warn!(%group, ?completion, received, "consumer finished early");
                break;
            }
        }
    }

    let secs = started.elapsed().as_secs_f64();
    Ok(GroupReport {
        group,
        received,
        out_of_order,
        secs,
        per_sec: rate(received, secs),
    })
}

fn total_records(args: &BenchArgs) -> Result<u64, ServerError> {
    u64::try_from(args.producers)
        .ok()
        .and_then(|producers| args.records.checked_mul(producers))
        .ok_or_else(|| {
            ServerError::Args(format!(
                "--records {} x --producers {} overflows",
                args.records, args.producers
            ))
        })
}

fn rate(count: u64, secs: f64) -> f64 {
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}
