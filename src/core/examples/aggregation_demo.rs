use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use env_logger::Env;
use log::info;
use pagetrace::clock::SystemClock;
use pagetrace::session_management::Aggregator;
use pagetrace::storage::DatabaseRepository;
use serde_json::json;

#[tokio::main]
async fn main() {
    // RUST_LOG can override; default to info
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();

    let out_dir: PathBuf = env::var("PAGETRACE_DEMO_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::current_dir()
                .expect("cwd")
                .join("target")
                .join("pagetrace_demo")
        });
    fs::create_dir_all(&out_dir).expect("create output dir");
    let db_path = out_dir.join("aggregation_demo.sqlite3");
    info!("Using DatabaseRepository at {}", db_path.display());

    let repo = DatabaseRepository::new_file(&db_path)
        .await
        .expect("open database");
    let aggregator = Aggregator::new(Arc::new(repo), Arc::new(SystemClock));

    // first periodic flush of a page view
    let ids = aggregator
        .ingest(json!([
            { "type": "init", "sessionId": "demo", "page": "/shop", "timestamp": 0, "duration": 1000 },
            { "type": "click", "sessionId": "demo", "page": "/shop", "timestamp": 100, "x": 10, "y": 20 },
            { "type": "activity", "sessionId": "demo", "page": "/shop", "timestamp": 200 }
        ]))
        .await
        .expect("ingest first batch");
    info!("First batch saved into {:?}", ids);

    // later flush: heartbeat init plus a new click, same document
    let ids = aggregator
        .ingest(json!([
            { "type": "init", "sessionId": "demo", "page": "/shop", "timestamp": 0, "duration": 5000 },
            { "type": "click", "sessionId": "demo", "page": "/shop", "timestamp": 4200, "x": 300, "y": 40 }
        ]))
        .await
        .expect("ingest second batch");
    info!("Second batch saved into {:?}", ids);

    let documents = aggregator.documents().await.expect("list documents");
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "events": documents })).expect("serialize")
    );
}
