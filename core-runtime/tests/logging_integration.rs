//! Integration tests for logging system

use bridge_traits::logging::LogLevel;
use core_runtime::logging::{redact_if_sensitive, redact_url, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.redact);
    assert!(config.logger_sink.is_none());
    assert!(config.filter.is_none());
}

#[test]
fn test_signed_urls_are_truncated() {
    let signed = "https://media.example.com/clips/42.mp4?X-Amz-Signature=deadbeef&X-Amz-Expires=60";
    assert_eq!(redact_url(signed), "https://media.example.com/clips/42.mp4");

    // The fragment goes too, even without a query.
    assert_eq!(
        redact_url("https://media.example.com/clips/42.mp4#frag"),
        "https://media.example.com/clips/42.mp4"
    );
}

#[test]
fn test_header_redaction() {
    assert_eq!(redact_if_sensitive("authorization", "Bearer t"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("X-Auth-Token", "t"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("User-Agent", "player/1.0"), "player/1.0");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
