use backpressure::{
    CapacityControlConfig, CircuitBreakerSettings, Engine, EngineConfig, Priority,
    RateLimitConfig, TaskContext,
};
use std::time::Duration;

#[test]
fn partial_json_falls_back_to_defaults() {
    let json = r#"{
        "name": "ingest",
        "max_workers": 8,
        "queue_capacity": 32,
        "rate_limit": { "capacity": 10.0, "refill_rate": 5.0 },
        "shed_thresholds": { "low": 0.4 },
        "capacity_control": { "enabled": false }
    }"#;
    let config: EngineConfig = serde_json::from_str(json).unwrap();
    let defaults = EngineConfig::default();

    assert_eq!(config.name, "ingest");
    assert_eq!(config.min_workers, defaults.min_workers);
    assert_eq!(config.max_workers, 8);
    assert_eq!(config.queue_capacity, 32);
    assert_eq!(
        config.rate_limit,
        Some(RateLimitConfig {
            capacity: 10.0,
            refill_rate: 5.0
        })
    );
    assert_eq!(config.circuit_breaker, None);
    assert_eq!(config.shed_thresholds.get(Priority::Low), Some(0.4));
    assert_eq!(
        config.shed_thresholds.get(Priority::Normal),
        defaults.shed_thresholds.get(Priority::Normal)
    );
    assert_eq!(config.shed_thresholds.get(Priority::Critical), None);
    assert!(!config.capacity_control.enabled);
    assert_eq!(
        config.capacity_control.interval,
        CapacityControlConfig::default().interval
    );
    assert_eq!(config.latency_target, defaults.latency_target);
}

#[test]
fn config_survives_a_json_round_trip() {
    let config = EngineConfig {
        name: "billing".to_string(),
        min_workers: 2,
        max_workers: 6,
        initial_workers: Some(3),
        max_concurrency: Some(4),
        circuit_breaker: Some(CircuitBreakerSettings {
            failure_threshold: 3,
            reset_timeout: Duration::from_millis(1500),
        }),
        ..EngineConfig::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    let back: EngineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[tokio::test]
async fn engine_starts_from_plain_config() {
    let engine = Engine::new(EngineConfig {
        name: "plain".to_string(),
        min_workers: 2,
        max_workers: 4,
        initial_workers: Some(3),
        max_concurrency: Some(2),
        queue_capacity: 5,
        rate_limit: Some(RateLimitConfig {
            capacity: 100.0,
            refill_rate: 100.0,
        }),
        circuit_breaker: Some(CircuitBreakerSettings::default()),
        capacity_control: super::quiet_control(),
        ..EngineConfig::default()
    })
    .unwrap();

    assert_eq!(engine.name(), "plain");
    let stats = engine.pool_stats();
    assert_eq!(stats.target_workers, 3);
    assert_eq!(stats.queue_capacity, 5);
    assert_eq!(stats.max_concurrency, 2);
    assert!(engine.rate_limiter().is_some());
    assert!(engine.circuit_breaker().is_some());
    assert_eq!(engine.capacity_controller().min_workers(), 2);
    assert_eq!(engine.capacity_controller().max_workers(), 4);

    let handle = engine
        .submit_guarded(Priority::High, |ctx: TaskContext| async move {
            Ok::<_, ()>(ctx.priority())
        })
        .unwrap();
    assert_eq!(handle.await, Ok(Priority::High));

    engine.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn invalid_settings_are_reported_by_field() {
    let cases: Vec<(EngineConfig, &str)> = vec![
        (
            EngineConfig {
                min_workers: 0,
                ..EngineConfig::default()
            },
            "min_workers",
        ),
        (
            EngineConfig {
                min_workers: 5,
                max_workers: 2,
                ..EngineConfig::default()
            },
            "max_workers",
        ),
        (
            EngineConfig {
                max_concurrency: Some(0),
                ..EngineConfig::default()
            },
            "max_concurrency",
        ),
        (
            EngineConfig {
                rate_limit: Some(RateLimitConfig {
                    capacity: 0.0,
                    refill_rate: 1.0,
                }),
                ..EngineConfig::default()
            },
            "capacity",
        ),
        (
            EngineConfig {
                circuit_breaker: Some(CircuitBreakerSettings {
                    failure_threshold: 0,
                    reset_timeout: Duration::from_secs(1),
                }),
                ..EngineConfig::default()
            },
            "failure_threshold",
        ),
        (
            EngineConfig {
                capacity_control: CapacityControlConfig {
                    safety_multiplier: 0.5,
                    ..CapacityControlConfig::default()
                },
                ..EngineConfig::default()
            },
            "safety_multiplier",
        ),
    ];

    for (config, field) in cases {
        let err = Engine::new(config).unwrap_err();
        assert_eq!(err.field, field, "{err}");
    }
}
