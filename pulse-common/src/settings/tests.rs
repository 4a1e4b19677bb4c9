use super::*;
use crate::auth::{AuthenticatedUser, Role};
use crate::db::{configurations, connect_in_memory};
use crate::Error;
use serde_json::json;
use uuid::Uuid;

fn admin() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        display_name: "admin".into(),
        role: Role::Admin,
    }
}

#[test]
fn test_every_registered_default_is_valid() {
    for meta in registry() {
        let result = validate_configuration(meta.category, meta.key, &meta.default_value, None)
            .unwrap();
        assert!(result.valid, "{}: {:?}", meta.path(), result.errors);
        assert!(result.warnings.is_empty(), "{}: {:?}", meta.path(), result.warnings);
    }
}

#[test]
fn test_unknown_key_is_not_found() {
    let err = validate_configuration("ai", "flux_capacitor", &json!(1), None).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_inverted_priority_thresholds_fail_business_rule() {
    let value = json!({"critical": 50, "high": 60, "medium": 30, "low": 10});
    let result = validate_configuration("scoring", "priority_thresholds", &value, None).unwrap();

    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("business rule 'descending_order'")
            && e.contains("critical (50) must be greater than high (60)")));
}

#[test]
fn test_narrow_priority_spread_fails() {
    let value = json!({"critical": 80, "high": 75, "medium": 40, "low": 20});
    let result = validate_configuration("scoring", "priority_thresholds", &value, None).unwrap();
    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("minimum_spread"));
}

#[test]
fn test_weights_must_sum_to_one() {
    let bad = json!({"length": 0.5, "keywords": 0.5, "context": 0.5});
    let result = validate_configuration("scoring", "difficulty_weights", &bad, None).unwrap();
    assert!(!result.valid);

    let good = json!({"length": 0.2, "keywords": 0.5, "context": 0.3});
    assert!(validate_configuration("scoring", "difficulty_weights", &good, None)
        .unwrap()
        .valid);
}

#[test]
fn test_type_and_bounds_errors_name_the_field() {
    let result = validate_configuration("ai", "max_tokens", &json!("lots"), None).unwrap();
    assert_eq!(result.errors, vec!["ai.max_tokens: expected integer, got string"]);

    let result = validate_configuration("ai", "temperature", &json!(2.5), None).unwrap();
    assert_eq!(result.errors, vec!["ai.temperature: value 2.5 out of range [0, 2]"]);

    let result = validate_configuration("ai", "model", &json!("text-davinci-003"), None).unwrap();
    assert!(!result.valid);
}

#[test]
fn test_comparison_with_existing_only_warns() {
    let result =
        validate_configuration("ai", "max_tokens", &json!(2000), Some(&json!(2000))).unwrap();
    assert!(result.valid);
    assert_eq!(result.warnings, vec!["ai.max_tokens: value is unchanged"]);

    let result =
        validate_configuration("ai", "max_tokens", &json!(4000), Some(&json!(2000))).unwrap();
    assert!(result.valid);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("changes by 100%"));

    let result =
        validate_configuration("ai", "max_tokens", &json!(2500), Some(&json!(2000))).unwrap();
    assert!(result.warnings.is_empty());
}

#[test]
fn test_into_result_carries_field_messages() {
    let result = validate_configuration("ai", "worker_count", &json!(64), None).unwrap();
    match result.into_result() {
        Err(Error::Validation(errors)) => {
            assert_eq!(errors, vec!["ai.worker_count: value 64 out of range [1, 16]"])
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_history_limit_is_clamped() {
    assert_eq!(clamp_history_limit(1000), MAX_HISTORY_LIMIT);
    assert_eq!(clamp_history_limit(0), 1);
    assert_eq!(clamp_history_limit(-5), 1);
    assert_eq!(clamp_history_limit(25), 25);
}

#[tokio::test]
async fn test_configuration_runs_only_after_validation() {
    let pool = connect_in_memory().await.unwrap();
    let validator = ConfigurationValidator::new(pool);

    let result = validator
        .test_configuration("ai", "operation_timeout_seconds", &json!(1))
        .await
        .unwrap();
    assert!(!result.passed);
    assert!(result.errors[0].starts_with("validation: "));
}

#[tokio::test]
async fn test_timeout_dry_run_checks_provider_budget() {
    let pool = connect_in_memory().await.unwrap();
    let validator = ConfigurationValidator::new(pool);

    let too_short = validator
        .test_configuration("ai", "operation_timeout_seconds", &json!(6))
        .await
        .unwrap();
    assert!(!too_short.passed);

    let tight = validator
        .test_configuration("ai", "operation_timeout_seconds", &json!(12))
        .await
        .unwrap();
    assert!(tight.passed);
    assert_eq!(tight.warnings.len(), 1);

    let fine = validator
        .test_configuration("ai", "operation_timeout_seconds", &json!(60))
        .await
        .unwrap();
    assert!(fine.passed);
    assert!(fine.warnings.is_empty());
}

#[tokio::test]
async fn test_max_tokens_dry_run_uses_stored_model() {
    let pool = connect_in_memory().await.unwrap();
    configurations::seed_defaults(&pool, DEFAULT_ENVIRONMENT)
        .await
        .unwrap();
    let validator = ConfigurationValidator::new(pool.clone());

    // Default model allows 16384
    let result = validator
        .test_configuration("ai", "max_tokens", &json!(8000))
        .await
        .unwrap();
    assert!(result.passed, "{:?}", result.errors);

    let request = ChangeRequest {
        key: ConfigKey::new("ai", "model"),
        value: json!("gpt-4-turbo"),
        expected_version: None,
        reason: None,
    };
    configurations::apply_configuration_change(&pool, &request, &admin())
        .await
        .unwrap();

    let result = validator
        .test_configuration("ai", "max_tokens", &json!(8000))
        .await
        .unwrap();
    assert!(!result.passed);
    assert!(result.errors[0].contains("gpt-4-turbo"));
}

#[tokio::test]
async fn test_validator_history_is_capped() {
    let pool = connect_in_memory().await.unwrap();
    let editor = admin();
    for i in 0..105 {
        let request = ChangeRequest {
            key: ConfigKey::new("issues", "heatmap_decay_days"),
            value: json!(1 + (i % 300)),
            expected_version: None,
            reason: None,
        };
        configurations::apply_configuration_change(&pool, &request, &editor)
            .await
            .unwrap();
    }

    let validator = ConfigurationValidator::new(pool);
    let history = validator
        .get_configuration_history(None, None, 1000)
        .await
        .unwrap();
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].version, 105);
    assert!(history.windows(2).all(|w| w[0].id > w[1].id));
}
