use super::*;

#[test]
fn defaults_match_repository_lifetimes() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.default_ttl, Duration::from_secs(1800));
    assert_eq!(settings.prewarm.today_ttl, Duration::from_secs(900));
    assert_eq!(settings.cache.negative_ttl, None);
    assert_eq!(settings.cache.max_entries.get(), 10_000);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.isolation.strategy, RelaxedReads::Session);
    assert!(settings.cache.enabled);
    assert!(settings.prewarm.enabled);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.database.url = Some("postgres://file".to_string());

    raw.apply_logging_overrides(&LoggingOverrides {
        log_level: Some("debug".to_string()),
        log_json: Some(true),
    });
    raw.apply_database_override(&DatabaseOverride {
        database_url: Some("postgres://cli".to_string()),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.database.url.as_deref(), Some("postgres://cli"));
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn negative_ttl_is_enabled_by_a_positive_value() {
    let mut raw = RawSettings::default();
    raw.cache.negative_ttl_seconds = Some(30);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.negative_ttl, Some(Duration::from_secs(30)));
}

#[test]
fn zero_values_are_rejected_with_their_key() {
    let cases: [(&str, fn(&mut RawSettings)); 4] = [
        ("cache.default_ttl_seconds", |raw| {
            raw.cache.default_ttl_seconds = Some(0)
        }),
        ("cache.max_entries", |raw| raw.cache.max_entries = Some(0)),
        ("database.max_connections", |raw| {
            raw.database.max_connections = Some(0)
        }),
        ("prewarm.refresh_interval_seconds", |raw| {
            raw.prewarm.refresh_interval_seconds = Some(0)
        }),
    ];

    for (expected, mutate) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected),
            other => panic!("expected invalid `{expected}`, got {other:?}"),
        }
    }
}

#[test]
fn isolation_strategy_is_parsed() {
    let mut raw = RawSettings::default();
    raw.isolation.strategy = Some("statement_hints".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.isolation.strategy, RelaxedReads::StatementHints);

    let mut raw = RawSettings::default();
    raw.isolation.strategy = Some("snapshot".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "isolation.strategy",
            ..
        })
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}

#[test]
fn parse_rewrite_arguments() {
    let args = CliArgs::parse_from(["ppreporter-cache", "rewrite", "/tmp/query.sql"]);
    match args.command {
        Command::Rewrite(rewrite) => {
            assert_eq!(
                rewrite.file.as_deref(),
                Some(std::path::Path::new("/tmp/query.sql"))
            );
        }
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["ppreporter-cache", "rewrite"]);
    assert!(matches!(args.command, Command::Rewrite(RewriteArgs { file: None })));
}

#[test]
fn parse_prewarm_arguments() {
    let args = CliArgs::parse_from([
        "ppreporter-cache",
        "prewarm",
        "--watch",
        "--database-url",
        "postgres://example",
        "--log-level",
        "debug",
    ]);

    assert_eq!(args.logging.log_level.as_deref(), Some("debug"));
    match args.command {
        Command::Prewarm(prewarm) => {
            assert!(prewarm.watch);
            assert_eq!(
                prewarm.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_stats_arguments() {
    let args = CliArgs::parse_from([
        "ppreporter-cache",
        "--log-json",
        "true",
        "stats",
        "--database-url",
        "postgres://example",
    ]);

    assert_eq!(args.logging.log_json, Some(true));
    match args.command {
        Command::Stats(stats) => {
            assert_eq!(
                stats.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
