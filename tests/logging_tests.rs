use surplus_arbiter::config::LoggingConfig;
use surplus_arbiter::logging::{LogContext, get_logger_with_context, init_logging, min_level, parse_log_level};
use tracing::Level;

#[test]
fn level_names_accept_common_aliases() {
    assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("CRITICAL").unwrap(), Level::ERROR);
    assert!(parse_log_level("loud").is_err());
    assert_eq!(min_level(Level::INFO, Level::DEBUG), Level::DEBUG);
    assert_eq!(min_level(Level::ERROR, Level::WARN), Level::WARN);
}

#[test]
fn console_only_init_is_idempotent() {
    let config = LoggingConfig {
        file: String::new(),
        ..Default::default()
    };
    assert!(init_logging(&config).is_ok());
    assert!(init_logging(&config).is_ok());

    let logger = get_logger_with_context(LogContext::new("tests").with_cycle_id("c-1".to_string()));
    logger.info("logging works after init");
}
