//! Tests for [`QueueConfiguration`].

use super::*;

#[test]
fn test_default_values() {
    let config = QueueConfiguration::default();

    assert_eq!(config.batch_size, 16);
    assert_eq!(config.new_batch_threshold(), 8);
    assert_eq!(config.max_dequeue_count, 5);
    assert_eq!(config.visibility_timeout, Duration::ZERO);
    assert_eq!(config.max_polling_interval, Duration::from_secs(60));
    assert_eq!(
        config.minimum_visibility_renewal_interval,
        Duration::from_secs(60)
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_new_batch_threshold_follows_batch_size() {
    let config = QueueConfiguration::new().with_batch_size(10);
    assert_eq!(config.new_batch_threshold(), 5);

    let config = config.with_new_batch_threshold(2);
    assert_eq!(config.new_batch_threshold(), 2);
}

#[test]
fn test_lease_duration_falls_back_when_visibility_timeout_is_zero() {
    let config = QueueConfiguration::default();
    assert_eq!(config.lease_duration(), DEFAULT_LEASE_DURATION);

    let config = config.with_visibility_timeout(Duration::from_secs(4));
    assert_eq!(config.lease_duration(), Duration::from_secs(4));
}

mod validation {
    use super::*;

    fn assert_invalid(config: QueueConfiguration, expected_field: &str) {
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid {}, got {:?}", expected_field, other),
        }
    }

    #[test]
    fn test_batch_size_bounds() {
        assert_invalid(QueueConfiguration::new().with_batch_size(0), "batch_size");
        assert_invalid(
            QueueConfiguration::new().with_batch_size(MAX_BATCH_SIZE + 1),
            "batch_size",
        );
        assert!(QueueConfiguration::new()
            .with_batch_size(MAX_BATCH_SIZE)
            .validate()
            .is_ok());
        assert!(QueueConfiguration::new().with_batch_size(1).validate().is_ok());
    }

    #[test]
    fn test_threshold_cannot_exceed_batch_size() {
        assert_invalid(
            QueueConfiguration::new()
                .with_batch_size(4)
                .with_new_batch_threshold(5),
            "new_batch_threshold",
        );
        assert!(QueueConfiguration::new()
            .with_batch_size(4)
            .with_new_batch_threshold(4)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_max_dequeue_count_must_be_positive() {
        assert_invalid(
            QueueConfiguration::new().with_max_dequeue_count(0),
            "max_dequeue_count",
        );
    }

    #[test]
    fn test_max_polling_interval_floor() {
        assert_invalid(
            QueueConfiguration::new().with_max_polling_interval(Duration::from_millis(50)),
            "max_polling_interval",
        );
    }

    #[test]
    fn test_minimum_renewal_interval_must_be_positive() {
        assert_invalid(
            QueueConfiguration::new().with_minimum_visibility_renewal_interval(Duration::ZERO),
            "minimum_visibility_renewal_interval",
        );
    }
}

mod serialization {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: QueueConfiguration =
            serde_json::from_str(r#"{ "batch_size": 4, "visibility_timeout_ms": 4000 }"#).unwrap();

        assert_eq!(config.batch_size, 4);
        assert_eq!(config.new_batch_threshold(), 2);
        assert_eq!(config.visibility_timeout, Duration::from_secs(4));
        assert_eq!(config.max_dequeue_count, 5);
    }

    #[test]
    fn test_durations_serialize_as_milliseconds() {
        let config = QueueConfiguration::new().with_max_polling_interval(Duration::from_secs(2));
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["max_polling_interval_ms"], 2000);
        assert_eq!(json["visibility_timeout_ms"], 0);
    }
}
