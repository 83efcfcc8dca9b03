//! Tests for logging configuration parsing
//!
//! Only the pure parsing helpers are exercised; installing the global
//! subscriber is left to the binary.

use push_session::observability::logging::{parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_known_names() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("Compact"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    for input in ["invalid", "", "xml", "yaml", "123"] {
        assert_eq!(LogFormat::parse(input), LogFormat::Json, "input: '{input}'");
    }
}

#[test]
fn test_level_parsing_defaults_to_info() {
    assert_eq!(parse_level("warn"), Level::WARN);
    assert_eq!(parse_level("TRACE"), Level::TRACE);
    assert_eq!(parse_level(""), Level::INFO);
    assert_eq!(parse_level("loud"), Level::INFO);
}

#[test]
fn test_session_span_accepts_fields() {
    let span = push_session::session_span!(topic = "alerts", kind = "subscribe");
    let _entered = span.enter();
    tracing::info!("inside span");
}
