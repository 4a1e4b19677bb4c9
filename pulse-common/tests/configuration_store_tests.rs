//! Configuration store: seeding, versioned writes and history

use pulse_common::auth::{AuthenticatedUser, Role};
use pulse_common::db::configurations::{
    apply_configuration_change, create_configuration, find_configuration,
    get_configuration_history, list_configurations, seed_defaults,
};
use pulse_common::db::connect_in_memory;
use pulse_common::settings::{
    lookup, registry, ChangeRequest, ConfigKey, SystemConfiguration, DEFAULT_ENVIRONMENT,
};
use pulse_common::Error;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

fn user(role: Role) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        display_name: format!("{} user", role),
        role,
    }
}

fn change(category: &str, key: &str, value: Value) -> ChangeRequest {
    ChangeRequest {
        key: ConfigKey::new(category, key),
        value,
        expected_version: None,
        reason: None,
    }
}

async fn seeded_pool() -> SqlitePool {
    let pool = connect_in_memory().await.unwrap();
    seed_defaults(&pool, DEFAULT_ENVIRONMENT).await.unwrap();
    pool
}

#[tokio::test]
async fn test_seed_defaults_is_idempotent() {
    let pool = connect_in_memory().await.unwrap();
    let first = seed_defaults(&pool, DEFAULT_ENVIRONMENT).await.unwrap();
    assert_eq!(first, registry().len());
    assert_eq!(seed_defaults(&pool, DEFAULT_ENVIRONMENT).await.unwrap(), 0);

    let all = list_configurations(&pool, None, DEFAULT_ENVIRONMENT).await.unwrap();
    assert_eq!(all.len(), registry().len());
    assert!(all.iter().all(|c| c.version == 1));

    let ai = list_configurations(&pool, Some("ai"), DEFAULT_ENVIRONMENT).await.unwrap();
    assert_eq!(ai.len(), 8);

    let staging = list_configurations(&pool, None, "staging").await.unwrap();
    assert!(staging.is_empty());
}

#[tokio::test]
async fn test_applied_change_increments_version_and_appends_history() {
    let pool = seeded_pool().await;
    let admin = user(Role::Admin);

    let mut request = change("ai", "max_tokens", json!(4000));
    request.reason = Some("longer summaries".into());
    let applied = apply_configuration_change(&pool, &request, &admin).await.unwrap();

    assert_eq!(applied.configuration.version, 2);
    assert_eq!(applied.configuration.value, json!(4000));
    assert_eq!(applied.configuration.updated_by, Some(admin.user_id));
    // 2000 -> 4000 is a large jump
    assert_eq!(applied.warnings.len(), 1);

    let stored = find_configuration(&pool, &ConfigKey::new("ai", "max_tokens"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, applied.configuration);

    let history = get_configuration_history(&pool, Some("ai"), Some("max_tokens"), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_value, Some(json!(2000)));
    assert_eq!(history[0].new_value, json!(4000));
    assert_eq!(history[0].version, 2);
    assert_eq!(history[0].changed_by, admin.user_id);
    assert_eq!(history[0].reason.as_deref(), Some("longer summaries"));
    assert_eq!(history[0], applied.change);
}

#[tokio::test]
async fn test_rejected_change_leaves_storage_untouched() {
    let pool = seeded_pool().await;
    let admin = user(Role::Admin);
    let key = ConfigKey::new("scoring", "priority_thresholds");

    let request = ChangeRequest {
        key: key.clone(),
        value: json!({"critical": 50, "high": 60, "medium": 40, "low": 20}),
        expected_version: None,
        reason: None,
    };
    let err = apply_configuration_change(&pool, &request, &admin).await.unwrap_err();
    match err {
        Error::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("descending_order")))
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let stored = find_configuration(&pool, &key).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(
        stored.value,
        json!({"critical": 80, "high": 60, "medium": 40, "low": 20})
    );
    assert!(get_configuration_history(&pool, None, None, 100)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_only_admins_write() {
    let pool = seeded_pool().await;
    let request = change("ai", "temperature", json!(0.2));

    for role in [Role::Viewer, Role::Member] {
        let err = apply_configuration_change(&pool, &request, &user(role))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}

#[tokio::test]
async fn test_stale_expected_version_conflicts() {
    let pool = seeded_pool().await;
    let admin = user(Role::Admin);

    let mut request = change("ai", "worker_count", json!(4));
    request.expected_version = Some(1);
    apply_configuration_change(&pool, &request, &admin).await.unwrap();

    // Second writer still believes version 1
    request.value = json!(6);
    let err = apply_configuration_change(&pool, &request, &admin).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let stored = find_configuration(&pool, &ConfigKey::new("ai", "worker_count"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.value, json!(4));
}

#[tokio::test]
async fn test_first_write_to_unseeded_key_creates_version_one() {
    let pool = connect_in_memory().await.unwrap();
    let admin = user(Role::Admin);
    let key = ConfigKey::new("issues", "heatmap_decay_days").with_environment("staging");

    let request = ChangeRequest {
        key: key.clone(),
        value: json!(14),
        expected_version: None,
        reason: None,
    };
    let applied = apply_configuration_change(&pool, &request, &admin).await.unwrap();
    assert_eq!(applied.configuration.version, 1);
    assert_eq!(applied.change.old_value, None);

    let unknown = change("issues", "colour", json!("red"));
    let err = apply_configuration_change(&pool, &unknown, &admin).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_create_configuration_validates_and_rejects_duplicates() {
    let pool = connect_in_memory().await.unwrap();
    let meta = lookup("ai", "model").unwrap();

    let mut config = SystemConfiguration::from_metadata(meta, "staging", "team-a");
    create_configuration(&pool, &config).await.unwrap();

    let err = create_configuration(&pool, &config).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    config.scope = "team-b".into();
    config.value = json!("not-a-model");
    let err = create_configuration(&pool, &config).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let found = find_configuration(
        &pool,
        &ConfigKey::new("ai", "model")
            .with_environment("staging")
            .with_scope("team-a"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(found.value, json!("gpt-4o-mini"));
    assert_eq!(found.validation_rules, meta.schema);
}

#[tokio::test]
async fn test_history_filters_and_caps() {
    let pool = seeded_pool().await;
    let admin = user(Role::Admin);

    for days in 1..=110 {
        apply_configuration_change(&pool, &change("issues", "heatmap_decay_days", json!(days)), &admin)
            .await
            .unwrap();
    }
    apply_configuration_change(&pool, &change("ai", "temperature", json!(0.5)), &admin)
        .await
        .unwrap();

    let capped = get_configuration_history(&pool, None, None, 1000).await.unwrap();
    assert_eq!(capped.len(), 100);
    assert_eq!(capped[0].key, "temperature");

    let issues = get_configuration_history(&pool, Some("issues"), None, 5).await.unwrap();
    assert_eq!(issues.len(), 5);
    assert!(issues.iter().all(|c| c.category == "issues"));
    assert_eq!(issues[0].new_value, json!(110));
    assert_eq!(issues[0].version, 111);

    let at_least_one = get_configuration_history(&pool, Some("ai"), None, 0).await.unwrap();
    assert_eq!(at_least_one.len(), 1);
}
