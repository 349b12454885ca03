//! End-to-end runs from NDJSON files into the filesystem sink

use anonymize_it::config::parse_config;
use anonymize_it::core::pipeline::AnonymizationPipeline;
use anonymize_it::domain::AnonymizeError;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_ndjson(path: &Path, documents: &[Value]) {
    let body: String = documents.iter().map(|d| format!("{d}\n")).collect();
    fs::write(path, body).unwrap();
}

fn config_toml(input: &Path, output: &Path, extra: &str) -> String {
    format!(
        r#"
include_rest = true
sensitive = ["message"]

[source]
type = "file"
[source.params]
path = '{}'
query = {{ "event.kind" = "alert" }}

[dest]
type = "filesystem"
[dest.params]
directory = '{}'

[include]
"source.ip" = "ipv4"
"host.name" = "infer"

[masking]
batch_size = 2
seed = 99

[redaction]
keywords = ["DROP_ME"]
{extra}
"#,
        input.display(),
        output.display()
    )
}

fn read_output(directory: &Path) -> Vec<(String, Vec<Value>)> {
    let mut files: Vec<_> = fs::read_dir(directory)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
        .into_iter()
        .map(|path| {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            let documents = fs::read_to_string(&path)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect();
            (name, documents)
        })
        .collect()
}

#[tokio::test]
async fn test_directory_of_ndjson_files() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_ndjson(
        &input.path().join("part-1.ndjson"),
        &[
            json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.1"}, "host": {"name": "db-1"}, "message": "ok"}),
            json!({"event": {"kind": "metric"}, "source": {"ip": "10.1.1.2"}, "host": {"name": "db-2"}}),
        ],
    );
    write_ndjson(
        &input.path().join("part-2.jsonl"),
        &[
            json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.1"}, "host": {"name": "db-3"}, "message": "DROP_ME"}),
            json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.3"}, "host": {"name": "db-1"}, "message": "token=1 password=secret"}),
            json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.3"}, "host": {"name": "db-4"}}),
        ],
    );
    fs::write(input.path().join("README.txt"), "not a data file").unwrap();

    let config = parse_config(&config_toml(input.path(), output.path(), "")).unwrap();
    let mut pipeline = AnonymizationPipeline::from_config(&config).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.total_expected, Some(4));
    assert_eq!(summary.records_seen, 4);
    assert_eq!(summary.records_dropped, 1);
    assert_eq!(summary.secrets_removed, 1);
    assert_eq!(summary.records_emitted, 3);
    assert_eq!(summary.masked_fields, 2);

    let files = read_output(output.path());
    let names: Vec<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["batch-000000.ndjson", "batch-000001.ndjson"]);

    let documents: Vec<Value> = files.into_iter().flat_map(|(_, docs)| docs).collect();
    assert_eq!(documents.len(), 3);

    // Same original, same replacement, across files and batches
    assert_eq!(documents[0]["host.name"], documents[1]["host.name"]);
    assert_ne!(documents[0]["source.ip"], json!("10.1.1.1"));
    assert_eq!(documents[1]["source.ip"], documents[2]["source.ip"]);
    assert_eq!(documents[0]["message"], json!("ok"));
    assert!(documents[1].get("message").is_none());
    assert!(documents.iter().all(|d| d["event.kind"] == json!("alert")));
}

#[tokio::test]
async fn test_dry_run_leaves_output_empty() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let target = output.path().join("never-created");
    write_ndjson(
        &input.path().join("data.ndjson"),
        &[json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.1"}, "host": {"name": "a"}})],
    );

    let mut config = parse_config(&config_toml(input.path(), &target, "")).unwrap();
    config.application.dry_run = true;
    let summary = AnonymizationPipeline::from_config(&config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.records_emitted, 1);
    assert!(!target.exists());
}

#[tokio::test]
async fn test_inconsistent_types_across_files() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_ndjson(
        &input.path().join("a.ndjson"),
        &[json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.1"}, "host": {"name": "db-1"}})],
    );
    write_ndjson(
        &input.path().join("b.ndjson"),
        &[json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.2"}, "host": {"name": 17}})],
    );

    let config = parse_config(&config_toml(input.path(), output.path(), "")).unwrap();
    let mut pipeline = AnonymizationPipeline::from_config(&config).unwrap();
    let err = pipeline.run().await.unwrap_err();

    assert!(err.to_string().starts_with("mapping stage failed"));
    match err.root() {
        AnonymizeError::ProviderInference { field, message } => {
            assert_eq!(field, "host.name");
            assert!(message.contains("a.ndjson") && message.contains("b.ndjson"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(read_output(output.path()).is_empty());
}

#[tokio::test]
async fn test_malformed_line_reports_location() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let file = input.path().join("broken.ndjson");
    fs::write(
        &file,
        "{\"event\": {\"kind\": \"alert\"}, \"source\": {\"ip\": \"10.1.1.1\"}}\nnot json\n",
    )
    .unwrap();

    let config = parse_config(&config_toml(input.path(), output.path(), "")).unwrap();
    let err = AnonymizationPipeline::from_config(&config)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("broken.ndjson:2"), "{err}");
}

#[test]
fn test_missing_input_is_a_connection_error() {
    let output = TempDir::new().unwrap();
    let config = parse_config(&config_toml(
        Path::new("/nonexistent/input"),
        output.path(),
        "",
    ))
    .unwrap();

    let err = AnonymizationPipeline::from_config(&config).err().unwrap();
    assert!(err.is_connectivity());
    assert!(err.to_string().starts_with("init stage failed"));
}

#[tokio::test]
async fn test_user_pattern_scrubs_sensitive_text() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_ndjson(
        &input.path().join("data.ndjson"),
        &[json!({"event": {"kind": "alert"}, "source": {"ip": "10.1.1.1"}, "host": {"name": "a"}, "message": "opened /home/alice/notes.txt"})],
    );
    let extra = r#"
[[redaction.user_patterns]]
name = "home_dir"
pattern = '(/home/)[^/\s]+'
"#;

    let config = parse_config(&config_toml(input.path(), output.path(), extra)).unwrap();
    AnonymizationPipeline::from_config(&config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let files = read_output(output.path());
    let message = files[0].1[0]["message"].as_str().unwrap().to_string();
    assert!(!message.contains("alice"));
    assert!(message.starts_with("opened /home/"));
}
