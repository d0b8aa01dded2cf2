use std::sync::Once;

use serde_json::{json, Value};

use atlas::config::ClientConfig;
use atlas::AtlasClient;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        timeout_secs: 5,
        ..ClientConfig::with_base_url(base_url)
    }
}

pub fn client_for(base_url: &str) -> AtlasClient {
    init_test_logger();
    match AtlasClient::new(&client_config(base_url)) {
        Ok(client) => client,
        Err(error) => panic!("Expected client creation to succeed, got: {error}"),
    }
}

pub fn document_json(doc_id: &str, filename: &str, tags: &[&str]) -> Value {
    json!({
        "doc_id": doc_id,
        "filename": filename,
        "size": 2048,
        "mime_type": "application/pdf",
        "uploaded_at": "2024-06-01T12:00:00.123456",
        "chunks": 4,
        "tags": tags,
    })
}

pub fn list_json(items: Vec<Value>) -> Value {
    let total = items.len();
    json!({ "items": items, "total": total })
}

pub fn answer_json(answer: &str) -> Value {
    json!({
        "answer": answer,
        "sources": [{
            "doc_id": "d1",
            "filename": "manual.pdf",
            "chunk_index": 3,
            "snippet": "...",
            "score": 0.92
        }]
    })
}
