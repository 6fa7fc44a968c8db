//! End-to-end integration test.
//!
//! Proves the full pipeline: JSONL file → Reader → Ingest → BinTable →
//! AggregatorChain → eviction → JSONL sink.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use fb_config::FlowbinConfig;
use fb_runtime::lifecycle::Engine;
use fb_runtime::tracing_init::{DomainFormat, FileFields};

/// All record times sit on a 10s lattice boundary so time bins land
/// predictably: bin 0 covers [BASE, BASE+10s), bin 1 the next 10s.
const BASE: i64 = 1_500_000_000_000_000;

const SEC: i64 = 1_000_000;

fn record_line(saddr: &str, sport: u16, start: i64, end: i64, pkts: u64) -> String {
    format!(
        r#"{{"start_micros":{start},"end_micros":{end},"flow":{{"saddr":"{saddr}","daddr":"10.0.0.2","sport":{sport},"dport":443,"proto":"tcp"}},"counters":{{"src_pkts":{pkts},"dst_pkts":{pkts},"src_bytes":{b},"dst_bytes":{b}}}}}"#,
        b = pkts * 100,
    )
}

fn write_input(path: &Path, lines: &[String]) {
    let mut file = std::fs::File::create(path).expect("failed to create input file");
    for line in lines {
        writeln!(file, "{line}").expect("failed to write input line");
    }
}

fn setup_artifacts(test: &str) -> PathBuf {
    // Write to target/test-artifacts/ for easy post-run inspection.
    let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../target/test-artifacts")
        .join(test);
    std::fs::create_dir_all(&dir).expect("failed to create artifact dir");
    dir
}

fn init_test_tracing(dir: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_file = dir.join("e2e_pipeline.log");
    let _ = std::fs::remove_file(&log_file);
    let file_appender = tracing_appender::rolling::never(dir, "e2e_pipeline.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let initialised = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .event_format(DomainFormat::new())
                .with_test_writer()
                .with_filter(EnvFilter::try_new("info").unwrap()),
        )
        .with(
            fmt::layer()
                .event_format(DomainFormat::new())
                .fmt_fields(FileFields::default())
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(EnvFilter::try_new("debug").unwrap()),
        )
        .try_init()
        .is_ok();
    initialised.then_some(guard)
}

fn read_output(path: &Path) -> Vec<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read output {}: {e}", path.display()));
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("failed to parse output JSON"))
        .collect()
}

// -- 1. time_bins_merge_and_flush ------------------------------------------

/// Two flows in the first 10s bin (one reported twice and merged), one flow
/// in the second bin. Replay mode drives the clock from record times, so
/// results do not depend on test wall time.
#[tokio::test]
async fn time_bins_merge_and_flush() {
    let artifacts = setup_artifacts("e2e_time_bins");
    let _log_guard = init_test_tracing(&artifacts);

    let input_path = artifacts.join("flows.jsonl");
    let output_path = artifacts.join("bins.jsonl");
    let _ = std::fs::remove_file(&output_path);

    write_input(
        &input_path,
        &[
            record_line("10.0.0.1", 40001, BASE + SEC, BASE + 3 * SEC, 10),
            record_line("10.0.0.3", 40002, BASE + 2 * SEC, BASE + 5 * SEC, 4),
            record_line("10.0.0.1", 40001, BASE + 4 * SEC, BASE + 6 * SEC, 5),
            record_line("10.0.0.1", 40001, BASE + 12 * SEC, BASE + 14 * SEC, 7),
        ],
    );

    let toml_str = format!(
        r#"
[input]
path = "{}"
replay = true
rate = 1000000.0

[output]
path = "{}"

[bin]
mode = "time"
span = "10s"
modify = true
hold = "0s"

[runtime]
tick_interval = "1s"
channel_capacity = 64
"#,
        input_path.display(),
        output_path.display(),
    );
    let config: FlowbinConfig = toml_str.parse().expect("failed to parse config TOML");

    let engine = Engine::start(config).await.expect("Engine::start failed");
    engine.wait().await.expect("engine.wait failed");

    let records = read_output(&output_path);
    assert_eq!(
        records.len(),
        3,
        "expected 3 output records, got: {records:#?}",
    );

    // bin 0, rank 1: the merged 10.0.0.1 flow
    assert_eq!(records[0]["flow"]["sport"], 40001);
    assert_eq!(records[0]["start_micros"].as_i64().unwrap(), BASE + SEC);
    assert_eq!(
        records[0]["end_micros"].as_i64().unwrap(),
        BASE + 6 * SEC,
        "merge should widen the interval to both reports",
    );
    assert_eq!(records[0]["counters"]["src_pkts"].as_u64().unwrap(), 15);
    assert_eq!(records[0]["rank"].as_u64().unwrap(), 1);

    // bin 0, rank 2: 10.0.0.3
    assert_eq!(records[1]["flow"]["sport"], 40002);
    assert_eq!(records[1]["counters"]["src_pkts"].as_u64().unwrap(), 4);
    assert_eq!(records[1]["rank"].as_u64().unwrap(), 2);

    // bin 1 drains after bin 0, ranked from 1 again
    assert_eq!(records[2]["flow"]["sport"], 40001);
    assert_eq!(records[2]["start_micros"].as_i64().unwrap(), BASE + 12 * SEC);
    assert_eq!(records[2]["counters"]["src_pkts"].as_u64().unwrap(), 7);
    assert_eq!(records[2]["rank"].as_u64().unwrap(), 1);
}

// -- 2. unbinned_mode_aggregates_globally ----------------------------------

/// `mode = "none"` skips the bin table entirely: records flow into the
/// pipeline-level aggregator and drain once at shutdown, sorted and ranked.
#[tokio::test]
async fn unbinned_mode_aggregates_globally() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let input_path = dir.path().join("flows.jsonl");
    let output_path = dir.path().join("out.jsonl");

    write_input(
        &input_path,
        &[
            record_line("10.0.0.1", 40001, BASE + SEC, BASE + 3 * SEC, 10),
            record_line("10.0.0.3", 40002, BASE + 2 * SEC, BASE + 5 * SEC, 4),
            record_line("10.0.0.1", 40001, BASE + 4 * SEC, BASE + 6 * SEC, 5),
        ],
    );

    let toml_str = format!(
        r#"
[input]
path = "{}"
replay = true
rate = 1000000.0

[output]
path = "{}"

[bin]
mode = "none"
"#,
        input_path.display(),
        output_path.display(),
    );
    let config: FlowbinConfig = toml_str.parse().expect("failed to parse config TOML");

    let engine = Engine::start(config).await.expect("Engine::start failed");
    engine.wait().await.expect("engine.wait failed");

    let records = read_output(&output_path);
    assert_eq!(records.len(), 2, "expected 2 merged flows: {records:#?}");
    assert_eq!(records[0]["flow"]["sport"], 40001);
    assert_eq!(records[0]["counters"]["src_pkts"].as_u64().unwrap(), 15);
    assert_eq!(records[0]["rank"].as_u64().unwrap(), 1);
    assert_eq!(records[1]["flow"]["sport"], 40002);
    assert_eq!(records[1]["rank"].as_u64().unwrap(), 2);
}

// -- 3. shutdown_cancels_paced_replay --------------------------------------

/// A slow replay is interrupted by shutdown(); wait() must drain whatever
/// was ingested and return cleanly rather than run the replay to its end.
#[tokio::test]
async fn shutdown_cancels_paced_replay() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let input_path = dir.path().join("flows.jsonl");
    let output_path = dir.path().join("out.jsonl");

    // 200 records over 200 seconds; at rate 1.0 each gap paces at the
    // 100ms cap, so a full replay would take around 20 seconds.
    let lines: Vec<String> = (0..200)
        .map(|i| {
            record_line(
                "10.0.0.1",
                40001,
                BASE + i * SEC,
                BASE + i * SEC + SEC / 2,
                1,
            )
        })
        .collect();
    write_input(&input_path, &lines);

    let toml_str = format!(
        r#"
[input]
path = "{}"
replay = true
rate = 1.0

[output]
path = "{}"

[bin]
mode = "time"
span = "1m"
"#,
        input_path.display(),
        output_path.display(),
    );
    let config: FlowbinConfig = toml_str.parse().expect("failed to parse config TOML");

    let engine = Engine::start(config).await.expect("Engine::start failed");
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.shutdown();

    let waited = tokio::time::timeout(Duration::from_secs(5), engine.wait())
        .await
        .expect("engine.wait did not finish after shutdown");
    waited.expect("engine.wait failed");

    // Partial replay: something went through, but nowhere near all of it.
    let records = read_output(&output_path);
    assert!(!records.is_empty(), "expected at least one drained record");
}
