use super::*;
use serde_json::json;

fn metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

#[test]
fn document_id_is_sha256_of_title_and_chunk() {
    // sha256("a.txt_1")
    assert_eq!(
        document_id("a.txt", "1"),
        format!("{:x}", Sha256::digest(b"a.txt_1"))
    );
    assert_eq!(document_id("a.txt", "1").len(), 64);
    assert_eq!(document_id("a.txt", "1"), document_id("a.txt", "1"));
    assert_ne!(document_id("a.txt", "1"), document_id("a.txt", "2"));
    assert_ne!(document_id("a.txt", "1"), document_id("b.txt", "1"));
}

#[test]
fn document_id_for_renders_metadata_values() {
    let numeric = metadata(json!({"title": "a.txt", "chunk": 3, "source": "x"}));
    let textual = metadata(json!({"title": "a.txt", "chunk": "3"}));

    assert_eq!(document_id_for(&numeric), document_id("a.txt", "3"));
    assert_eq!(document_id_for(&numeric), document_id_for(&textual));
}

#[test]
fn missing_identity_keys_render_empty() {
    assert_eq!(document_id_for(&Metadata::new()), document_id("", ""));
    assert_eq!(
        document_id_for(&metadata(json!({"title": "only"}))),
        document_id("only", "")
    );
    assert_eq!(
        document_id_for(&metadata(json!({"title": null, "chunk": 0}))),
        document_id("", "0")
    );
}

#[test]
fn deletion_filter_matching() {
    let stored = metadata(json!({"title": "a.txt", "chunk": 2, "source": "/docs/a.txt"}));

    let by_title = DeletionFilter::new(metadata(json!({"title": "a.txt"})));
    let by_both = DeletionFilter::new(metadata(json!({"title": "a.txt", "chunk": 2})));
    let wrong_chunk = DeletionFilter::new(metadata(json!({"title": "a.txt", "chunk": 3})));
    let missing_key = DeletionFilter::new(metadata(json!({"lang": "en"})));

    assert!(by_title.matches(&stored));
    assert!(by_both.matches(&stored));
    assert!(!wrong_chunk.matches(&stored));
    assert!(!missing_key.matches(&stored));
    assert!(!DeletionFilter::default().matches(&stored));
}

#[test]
fn deletion_filter_deserializes_from_plain_object() {
    let filter: DeletionFilter =
        serde_json::from_value(json!({"title": "a.txt"})).expect("valid filter");
    assert_eq!(filter.len(), 1);
    assert_eq!(filter.get("title"), Some(&json!("a.txt")));
}

#[test]
fn dimension_checks() {
    let document = EmbeddedDocument {
        id: "x".to_string(),
        content: "x".to_string(),
        embedding: vec![0.0; 4],
        metadata: Metadata::new(),
    };

    assert!(ensure_dimensions(std::slice::from_ref(&document), 4).is_ok());
    assert!(matches!(
        ensure_dimensions(&[document], 8),
        Err(RagError::DimensionMismatch {
            expected: 8,
            actual: 4
        })
    ));
    assert!(ensure_query_dimension(&[0.0; 3], 3).is_ok());
    assert!(ensure_query_dimension(&[0.0; 2], 3).is_err());
}

#[tokio::test]
async fn connect_builds_memory_store() {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Memory;
    config.embedding.dimension = 128;

    let store = connect(&config).await.expect("memory store should open");
    assert_eq!(store.backend(), "memory");
    assert_eq!(store.dimension(), 128);
    assert_eq!(store.count().await.expect("count"), 0);
}
