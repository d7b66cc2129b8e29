//! End-to-end realtime ingestion through the public API.

use std::sync::Arc;
use std::time::Duration;

use pipeline_flow::testing::MemBrokerFactory;
use pipeline_flow::BuildFlowParams;
use pipeline_realtime::{RealtimeBuilder, RealtimeConfig};
use pipeline_types::{
    BuildFlowMode, BuildStep, Locator, PartitionId, ProcessedDocument, WorkflowMode,
};

fn fast_config() -> RealtimeConfig {
    RealtimeConfig {
        control_interval_ms: 10,
        ..Default::default()
    }
}

fn params() -> BuildFlowParams {
    BuildFlowParams::new(
        PartitionId::new("orders", BuildStep::Incremental, 1),
        BuildFlowMode::ProcessorAndBuilder,
        WorkflowMode::Realtime,
    )
}

fn processed_doc(offset: i64) -> ProcessedDocument {
    ProcessedDocument::new(Locator::new(1, offset), offset * 1000, vec![offset as u8])
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_realtime_build_ingests_stream_and_recovers() {
    let factory = Arc::new(MemBrokerFactory::new());
    factory.streaming(true);
    factory.seed_processed((1..=8).map(processed_doc).collect());
    // Stream head barely ahead of the read position.
    factory.processed_producer.set_max_timestamp(8000);
    factory.processed_producer.set_last_read_timestamp(8000);

    let rb = RealtimeBuilder::new(fast_config());
    rb.start(factory.clone(), params()).await;

    wait_until(|| factory.processed_consumer.items().len() == 8).await;
    let items = factory.processed_consumer.items();
    let offsets: Vec<i64> = items.iter().map(|d| d.locator.offset).collect();
    assert_eq!(offsets, (1..=8).collect::<Vec<i64>>());

    wait_until(|| rb.is_recovered()).await;
    assert!(!rb.build_flow().has_fatal_error().await);

    rb.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_memory_pressure_suspends_then_releases_ingestion() {
    let factory = Arc::new(MemBrokerFactory::new());
    factory.streaming(true);

    let rb = RealtimeBuilder::new(fast_config());
    rb.start(factory.clone(), params()).await;

    let flow = rb.build_flow().clone();
    wait_until_async(|| {
        let flow = flow.clone();
        async move { flow.is_started().await }
    })
    .await;

    factory.builder.set_memory_exceeded(true);
    let rb_suspended = &rb;
    wait_until_async(|| async { rb_suspended.is_suspended().await }).await;

    factory.builder.set_memory_exceeded(false);
    wait_until_async(|| async { !rb_suspended.is_suspended().await }).await;

    rb.stop().await;
}

async fn wait_until_async<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}
