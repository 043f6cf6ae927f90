//! Logging setup as a host plugin uses it.

use bridge_traits::console::LogLevel;
use core_runtime::logging::{redact_if_sensitive, strip_path, LogFormat, LoggingConfig};

#[test]
fn test_plugin_logging_config() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug)
        .with_filter("core_sync=trace,provider_kitsu=debug")
        .with_target(false);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Debug);
    assert!(config.redact_pii);
    assert!(!config.display_target);
    assert_eq!(
        config.filter.as_deref(),
        Some("core_sync=trace,provider_kitsu=debug")
    );
}

#[test]
fn test_default_format_follows_build_profile() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Compact);
}

#[test]
fn test_kitsu_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("kitsu_password", "secret"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("access_token", "eyJhbGciOi"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer eyJ"), "[REDACTED]");

    let user = redact_if_sensitive("username", "ana@studio.test");
    assert!(user.starts_with('a'));
    assert!(!user.contains("studio.test"));
}

#[test]
fn test_entity_names_pass_through() {
    assert_eq!(redact_if_sensitive("shot", "EP01.SQ01-SH010"), "EP01.SQ01-SH010");
    assert_eq!(redact_if_sensitive("preview_id", "preview-7"), "preview-7");
}

#[test]
fn test_thumbnail_paths_are_stripped() {
    assert_eq!(
        strip_path("/home/ana/proj/00_Pipeline/Shotinfo/SQ01-SH010_preview.jpg"),
        "SQ01-SH010_preview.jpg"
    );
    assert_eq!(
        strip_path("D:\\proj\\Assetinfo\\Chair_preview.jpg"),
        "Chair_preview.jpg"
    );
    assert_eq!(strip_path("/cache/thumbnails/"), "");
}
