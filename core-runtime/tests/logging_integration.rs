//! Integration tests for logging system

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.enable_spans);
    assert!(config.display_target);
    assert!(!config.display_thread_info);
}

#[test]
fn test_logging_initializes_once() {
    // A subscriber can only be installed once per process, so both the
    // successful and the rejected initialisation live in one test.
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());

    tracing::debug!(target: "core_decoder", "logging initialized");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_invalid_filter_rejected_before_install() {
    let config = LoggingConfig::default().with_filter("core_decoder=notalevel");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}
