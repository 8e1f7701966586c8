//! Warm-tier (Firestore-REST) registry integration tests (§4.3).

use chrono::Utc;
use equinewatch_models::{BarnId, BoundingBox, RegistryEntry, RegistryStatus, StreamId, TrackId};
use equinewatch_registry::{HotStore, IdentityRegistry, RegistryClient};

fn test_entry(id: &str, barn_id: &BarnId, stream_id: &StreamId) -> RegistryEntry {
    RegistryEntry {
        id: TrackId::new(id),
        stream_id: stream_id.clone(),
        barn_id: barn_id.clone(),
        name: Some("Integration Test Horse".to_string()),
        is_official: false,
        color_hex: "#ff8800".to_string(),
        last_updated_time: Utc::now(),
        bbox: BoundingBox::new(10.0, 10.0, 100.0, 200.0),
        confidence: 0.9,
        features: vec![0.1; 128],
        total_detections: 1,
        tracking_confidence: 0.9,
        status: RegistryStatus::Active,
        thumbnail_bytes: None,
    }
}

/// Test the warm REST client's raw document read path.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_warm_client_connection() {
    dotenvy::dotenv().ok();

    let client = RegistryClient::from_env().await.expect("Failed to create registry client");

    let result = client.get_document("_health", "_check").await;
    match result {
        Ok(_) => println!("Health check document exists"),
        Err(e) if e.to_string().contains("NOT_FOUND") || e.to_string().contains("404") => {
            println!("Health check document not found (expected)");
        }
        Err(e) => panic!("Unexpected error: {}", e),
    }
}

/// Test the two-tier `LoadBarn`/`SaveBarn` cycle (§4.3): writes to both
/// hot and warm, reads back with hot shadowing warm for volatile fields.
#[tokio::test]
#[ignore = "requires Redis and Firestore credentials"]
async fn test_load_save_barn_roundtrip() {
    use std::collections::HashMap;

    dotenvy::dotenv().ok();

    let hot = HotStore::from_env().expect("Failed to create hot store");
    let warm = RegistryClient::from_env().await.expect("Failed to create registry client");
    let registry = IdentityRegistry::new(hot, warm);

    let barn_id = BarnId::new("it-barn-registry");
    let stream_id = StreamId::new("it-stream-registry");
    let track_id = TrackId::new(format!("it-track-{}", uuid::Uuid::new_v4()));

    let mut entries = HashMap::new();
    let entry = RegistryEntry { id: track_id.clone(), ..test_entry(track_id.as_str(), &barn_id, &stream_id) };
    entries.insert(track_id.clone(), entry);

    registry.save_barn(&barn_id, &entries).await.expect("Failed to save barn");

    let loaded = registry
        .load_barn(&barn_id, &[stream_id.clone()])
        .await
        .expect("Failed to load barn");

    let reloaded = loaded.get(&track_id).expect("saved entry missing on reload");
    assert_eq!(reloaded.name.as_deref(), Some("Integration Test Horse"));

    // Resaving with a different feature vector exercises the one-shot
    // warm blend (`old.blend(new, 0.3)`) rather than overwriting in place.
    let mut second_pass = HashMap::new();
    let mut updated = reloaded.clone();
    updated.features = vec![0.9; 128];
    second_pass.insert(track_id.clone(), updated);
    registry.save_barn(&barn_id, &second_pass).await.expect("Failed to save barn (second pass)");

    let expired = registry.expire_hot(&stream_id).await.expect("Failed to expire hot");
    println!("expired {} hot entries for cleanup", expired);
}

/// Test the nearest-neighbor appearance lookup used when a new detection
/// doesn't match any actively tracked identity (§4.3).
#[tokio::test]
#[ignore = "requires Redis and Firestore credentials"]
async fn test_find_by_feature() {
    dotenvy::dotenv().ok();

    let hot = HotStore::from_env().expect("Failed to create hot store");
    let warm = RegistryClient::from_env().await.expect("Failed to create registry client");
    let registry = IdentityRegistry::new(hot, warm);

    let barn_id = BarnId::new("it-barn-registry");
    let probe = vec![0.1_f32; 128];

    let best = registry
        .find_by_feature(&barn_id, &probe, 0.7)
        .await
        .expect("Failed to search by feature");

    println!("best match: {:?}", best.map(|e| e.id.to_string()));
}
