use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mmap_appender::AppendLog;
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;

/// 测试参数
const TOTAL_SIZE: usize = 64 * 1024 * 1024; // 64MB
const RECORD_SIZE: usize = 256; // 每条日志 256 字节
const PAGE_COUNT: usize = 256; // 映射大小 = 256 页

fn record() -> Vec<u8> {
    let mut line = vec![b'x'; RECORD_SIZE - 1];
    line.push(b'\n');
    line
}

/// 使用 tokio::fs::File 顺序追加
async fn bench_tokio_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tokio_test.log");
    let line = record();

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .unwrap();

    for _ in 0..TOTAL_SIZE / RECORD_SIZE {
        file.write_all(&line).await.unwrap();
    }

    file.sync_all().await.unwrap();
}

/// 使用 std BufWriter 顺序追加
fn bench_buf_writer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buf_test.log");
    let line = record();

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .unwrap();
    let mut writer = BufWriter::with_capacity(PAGE_COUNT * 4096, file);

    for _ in 0..TOTAL_SIZE / RECORD_SIZE {
        writer.write_all(&line).unwrap();
    }

    writer.flush().unwrap();
    writer.get_ref().sync_all().unwrap();
}

/// 使用 AppendLog 顺序追加
fn bench_append_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mmap_test.log");
    let line = record();

    let mut log = AppendLog::open(&path, NonZeroUsize::new(PAGE_COUNT).unwrap()).unwrap();

    for _ in 0..TOTAL_SIZE / RECORD_SIZE {
        log.append(&line).unwrap();
    }

    log.sync_all().unwrap();
    log.close().unwrap();
}

fn append_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(20));
    group.throughput(Throughput::Bytes(TOTAL_SIZE as u64));

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let label = format!("{}MB_{}B_records", TOTAL_SIZE / (1024 * 1024), RECORD_SIZE);

    group.bench_function(BenchmarkId::new("tokio_file", &label), |b| {
        b.to_async(&runtime).iter(|| async {
            bench_tokio_file().await;
        });
    });

    group.bench_function(BenchmarkId::new("buf_writer", &label), |b| {
        b.iter(bench_buf_writer);
    });

    group.bench_function(BenchmarkId::new("append_log", &label), |b| {
        b.iter(bench_append_log);
    });

    group.finish();
}

criterion_group!(benches, append_benchmark);
criterion_main!(benches);
