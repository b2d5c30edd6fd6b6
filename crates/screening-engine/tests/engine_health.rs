// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the engine health snapshot

use fixtures::*;

#[tokio::test]
async fn healthy_engine_reports_all_components_up() {
    let fixture = engine_with(ScriptedClassifier::clean());

    let status = fixture.engine.health().await;

    assert!(status.overall_healthy);
    assert!(status.cache_healthy);
    assert!(status.whitelist_store_healthy);
    assert!(status.profile_store_healthy);
    assert!(status.interaction_store_healthy);
    assert!(status.classifier_healthy);
    assert!(status.learning_healthy);

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn degraded_cache_fails_the_health_check() {
    let fixture = engine_with(ScriptedClassifier::clean());
    fixture.engine.mark_cache_degraded("test");

    let status = fixture.engine.health().await;
    assert!(!status.cache_healthy);
    assert!(!status.overall_healthy);

    fixture.engine.clear_cache_degraded();
    let recovered = fixture.engine.health().await;
    assert!(recovered.overall_healthy);

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn stalled_classifier_fails_its_probe() {
    let fixture = engine_with(StalledClassifier);

    let status = fixture.engine.health().await;
    assert!(!status.classifier_healthy);
    assert!(!status.overall_healthy);
    assert!(status.cache_healthy);

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn health_snapshot_serializes() {
    let fixture = engine_with(ScriptedClassifier::clean());

    let status = fixture.engine.health().await;
    let json = serde_json::to_string(&status).expect("Failed to serialize health status");
    assert!(json.contains("\"overall_healthy\":true"));
    assert!(json.contains("cache_stats"));

    fixture.engine.shutdown().await;
}
