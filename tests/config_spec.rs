use holo_decor::config::{PayloadEncoding, PipelineConfig, SampleMode, TriggerPolicy};
use holo_decor::error::ConfigError;
use holo_decor::models::QualityBand;
use tempfile::TempDir;

fn setup() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

mod file_round_trip {
    use super::*;

    #[test]
    fn saved_config_loads_back_unchanged() {
        let dir = setup();
        let path = dir.path().join("holo-decor/config.json");
        let mut config = PipelineConfig::default();
        config.capture.trigger_policy = TriggerPolicy::OneShot;
        config.capture.payload_encoding = PayloadEncoding::Base64Json;
        config.gate.sample = SampleMode::CenterPixel;

        config.save_to(&path).unwrap();
        let loaded = PipelineConfig::try_load(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = setup();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "capture": { "period_ms": 4000, "trigger_policy": "periodic" },
                 "gate": { "acceptable": ["good"] } }"#,
        )
        .unwrap();

        let config = PipelineConfig::try_load(&path).unwrap();

        assert_eq!(config.capture.period_ms, 4000);
        assert_eq!(config.capture.trigger_policy, TriggerPolicy::Periodic);
        assert_eq!(config.capture.request_timeout_ms, 15_000);
        assert_eq!(config.gate.acceptable, vec![QualityBand::Good]);
        assert_eq!(config.placement.max_scale, 2.0);
    }
}

mod rejected_files {
    use super::*;

    #[test]
    fn unparsable_json_is_a_parse_error() {
        let dir = setup();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = PipelineConfig::try_load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_period_fails_validation() {
        let dir = setup();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "capture": { "period_ms": 0 } }"#).unwrap();

        let err = PipelineConfig::try_load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unordered_thresholds_fail_validation() {
        let dir = setup();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "gate": { "thresholds": { "too_dark_below": 120, "fair_below": 90, "good_below": 200 } } }"#,
        )
        .unwrap();

        let err = PipelineConfig::try_load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn nominal_scale_outside_zoom_bounds_fails_validation() {
        let dir = setup();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "asset": { "nominal_scale": [2.5, 1.0, 1.0] } }"#).unwrap();

        let err = PipelineConfig::try_load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = setup();

        let err = PipelineConfig::try_load(&dir.path().join("absent.json")).unwrap_err();

        assert!(matches!(err, ConfigError::Io(_)));
    }
}
