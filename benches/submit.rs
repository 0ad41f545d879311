use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use aura_log::config::SamplingConfig;
use aura_log::sinks::{SinkKind, SinkMetadata};
use aura_log::{
    LogLevel, LogPipeline, LogRecord, PipelineConfig, SamplingFilter, SecurityFilter, Sink,
    SinkResult,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

#[derive(Debug)]
struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
        black_box(batch.len());
        Ok(())
    }

    async fn shutdown(&self) -> SinkResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }

    fn metadata(&self) -> SinkMetadata {
        SinkMetadata::new("null", SinkKind::Custom)
    }
}

fn create_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_submit(c: &mut Criterion) {
    let runtime = create_runtime();
    let mut group = c.benchmark_group("submit");

    for buffer_size in [100usize, 1000] {
        let mut config = PipelineConfig::default();
        config.sampling.enabled = false;
        config.handler.buffer_size = buffer_size;

        let pipeline = {
            let _guard = runtime.enter();
            LogPipeline::builder()
                .config(config)
                .sink("null", Arc::new(NullSink))
                .build()
                .unwrap()
        };

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("buffer_size", buffer_size),
            &pipeline,
            |b, pipeline| {
                b.iter(|| {
                    pipeline.submit(LogRecord::new(
                        LogLevel::Info,
                        "bench.api",
                        "GET /appointments 200",
                    ))
                })
            },
        );

        runtime.block_on(pipeline.shutdown()).unwrap();
    }
    group.finish();
}

fn bench_filters(c: &mut Criterion) {
    let sampling = SamplingFilter::new(&SamplingConfig::default());
    let record = LogRecord::new(LogLevel::Warning, "bench.auth", "login for jane@example.com");

    c.bench_function("sampling_evaluate", |b| {
        b.iter(|| sampling.evaluate(black_box(&record)))
    });
    c.bench_function("security_scrub", |b| {
        b.iter(|| SecurityFilter::scrub(black_box("card 4111-1111-1111-1111 ssn 123-45-6789")))
    });
    c.bench_function("security_scrub_clean", |b| {
        b.iter(|| SecurityFilter::scrub(black_box("appointment 42 confirmed")))
    });
}

criterion_group!(benches, bench_submit, bench_filters);
criterion_main!(benches);
