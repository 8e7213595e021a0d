use eve_tail::{
    DEFAULT_PUBLISH_CAPACITY, EventPublisher, LogRecord, LogStream, TailConfig, watch_events,
    watch_log,
};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

fn scratch_log() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eve.json");
    (dir, path)
}

fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}

fn alerts(first: u64, count: u64) -> String {
    (first..first + count)
        .map(|seq| {
            format!(
                "{{\"timestamp\":\"2024-01-15T12:00:00.000000+0000\",\"event_type\":\"alert\",\"src_ip\":\"10.0.0.{}\",\"seq\":{}}}\n",
                seq % 255,
                seq
            )
        })
        .collect()
}

fn config_for(path: &Path) -> TailConfig {
    TailConfig::default()
        .with_path(path)
        .with_env_var(None)
        .with_poll_interval(Duration::from_millis(10))
        .with_wait_interval(Duration::from_millis(10))
        .with_retry_pause(Duration::from_millis(10))
}

/// Helper function to collect items from a stream with a timeout
async fn collect_records(
    stream: &mut LogStream,
    count: usize,
    timeout: Duration,
) -> Vec<LogRecord> {
    let mut items = Vec::new();
    let timeout_future = tokio::time::sleep(timeout);
    tokio::pin!(timeout_future);

    while items.len() < count {
        tokio::select! {
            item = stream.next() => {
                match item {
                    Some(item) => items.push(item),
                    None => break,
                }
            }
            _ = &mut timeout_future => break,
        }
    }

    items
}

fn seqs(records: &[LogRecord]) -> Vec<u64> {
    records.iter().filter_map(|r| r["seq"].as_u64()).collect()
}

#[tokio::test]
async fn test_backlog_and_appends_arrive_in_file_order() {
    let (_dir, path) = scratch_log();
    append(&path, &alerts(0, 5));

    let mut stream = watch_events(config_for(&path)).await.unwrap();
    let backlog = collect_records(&mut stream, 5, WAIT).await;
    assert_eq!(seqs(&backlog), vec![0, 1, 2, 3, 4]);

    append(&path, &alerts(5, 3));
    let live = collect_records(&mut stream, 3, WAIT).await;
    assert_eq!(seqs(&live), vec![5, 6, 7]);

    let extra = collect_records(&mut stream, 1, Duration::from_millis(100)).await;
    assert!(extra.is_empty());
}

#[tokio::test]
async fn test_json_array_backlog_yields_most_recent() {
    let (_dir, path) = scratch_log();
    let items: Vec<_> = (0..12).map(|seq| json!({"event_type": "flow", "seq": seq})).collect();
    append(&path, &serde_json::to_string_pretty(&items).unwrap());

    let config = config_for(&path).with_backlog_max_records(5);
    let mut stream = watch_events(config).await.unwrap();

    let records = collect_records(&mut stream, 5, WAIT).await;
    assert_eq!(seqs(&records), vec![7, 8, 9, 10, 11]);
}

#[tokio::test]
async fn test_two_line_record_delivered_once() {
    let (_dir, path) = scratch_log();
    append(&path, "");
    let mut stream = watch_events(config_for(&path)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    append(&path, "{\"event_type\":\"alert\",\"alert\":{\"signature_id\":2013028,\n");
    append(&path, "\"severity\":2},\"seq\":1}\n");

    let records = collect_records(&mut stream, 2, Duration::from_millis(500)).await;
    assert_eq!(
        records,
        vec![json!({
            "event_type": "alert",
            "alert": {"signature_id": 2013028, "severity": 2},
            "seq": 1
        })]
    );
}

#[tokio::test]
async fn test_truncation_resumes_with_new_content_only() {
    let (_dir, path) = scratch_log();
    append(&path, &alerts(0, 4));
    let mut stream = watch_events(config_for(&path)).await.unwrap();
    assert_eq!(collect_records(&mut stream, 4, WAIT).await.len(), 4);

    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    append(&path, &alerts(10, 2));

    let records = collect_records(&mut stream, 3, Duration::from_millis(500)).await;
    assert_eq!(seqs(&records), vec![10, 11]);
}

#[tokio::test]
async fn test_missing_file_then_created() {
    let (_dir, path) = scratch_log();
    let mut stream = watch_events(config_for(&path)).await.unwrap();

    let early = collect_records(&mut stream, 1, Duration::from_millis(100)).await;
    assert!(early.is_empty());

    append(&path, &alerts(0, 3));
    let records = collect_records(&mut stream, 3, WAIT).await;
    assert_eq!(seqs(&records), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_oversized_garbage_is_dropped() {
    let (_dir, path) = scratch_log();
    append(&path, "");
    let mut stream = watch_events(config_for(&path)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    append(&path, &"z".repeat(1_100_000));
    append(&path, "\n{\"event_type\":\"stats\",\"seq\":99,\"uptime\":12}\n");

    let records = collect_records(&mut stream, 2, Duration::from_millis(500)).await;
    assert_eq!(seqs(&records), vec![99]);
}

#[tokio::test]
async fn test_close_releases_the_file() {
    let (_dir, path) = scratch_log();
    append(&path, &alerts(0, 1));
    let mut stream = watch_events(config_for(&path)).await.unwrap();
    assert_eq!(collect_records(&mut stream, 1, WAIT).await.len(), 1);

    stream.close();
    let deadline = tokio::time::Instant::now() + WAIT;
    while !stream.is_finished() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stream.is_finished());

    append(&path, &alerts(1, 1));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_watch_log_with_defaults() {
    let (_dir, path) = scratch_log();
    append(&path, &alerts(0, 2));

    let mut stream = assert_ok!(watch_log(&path).await);
    assert_eq!(stream.path(), path.as_path());

    let records = collect_records(&mut stream, 2, WAIT).await;
    assert_eq!(seqs(&records), vec![0, 1]);
}

#[tokio::test]
async fn test_publisher_fans_out_to_subscribers() {
    let (_dir, path) = scratch_log();
    let stream = watch_events(config_for(&path)).await.unwrap();
    let publisher = EventPublisher::spawn(stream, DEFAULT_PUBLISH_CAPACITY);

    let mut dashboards = vec![publisher.subscribe().unwrap(), publisher.subscribe().unwrap()];
    append(&path, &alerts(0, 2));

    for dashboard in dashboards.iter_mut() {
        let mut received = Vec::new();
        while received.len() < 2 {
            match tokio::time::timeout(WAIT, dashboard.next()).await {
                Ok(Some(record)) => received.push(record["seq"].as_u64().unwrap()),
                _ => break,
            }
        }
        assert_eq!(received, vec![0, 1]);
    }

    publisher.shutdown();
    publisher.shutdown();
}

#[tokio::test]
async fn test_explicit_path_beats_environment() {
    const VAR: &str = "EVE_TAIL_IT_EXPLICIT_BEATS_ENV";
    let (_dir, explicit) = scratch_log();
    let (_other_dir, other) = scratch_log();
    append(&explicit, "{\"src\":\"explicit\"}\n");
    append(&other, "{\"src\":\"env\"}\n");
    unsafe { std::env::set_var(VAR, &other) };

    let config = config_for(&explicit).with_env_var(Some(VAR.to_owned()));
    let mut stream = watch_events(config).await.unwrap();
    assert_eq!(stream.path(), explicit.as_path());

    let records = collect_records(&mut stream, 2, Duration::from_millis(300)).await;
    assert_eq!(records, vec![json!({"src": "explicit"})]);

    unsafe { std::env::remove_var(VAR) };
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = TailConfig::default().with_max_pending_bytes(0);
    assert!(watch_events(config).await.is_err());
}
