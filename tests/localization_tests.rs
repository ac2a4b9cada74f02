//! # Localization Tests
//!
//! This module contains unit tests for the localization functionality,
//! testing message retrieval and formatting with various edge cases.

use meter_lookup_bot::localization::LocalizationManager;
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message("meter-prompt", None);
        assert_eq!(message, "Введите номер счётчика");
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message("nonexistent-key", None);
        assert!(message.starts_with("Missing translation:"));
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("name", "Пётр");
        args.insert("number", "0099");
        args.insert("region", "RegionX");

        let message = manager.get_message("meter-found", Some(&args));
        assert_eq!(message, "✅ Пётр, счётчик найден: 0099 в РЭС «RegionX»");
    }

    #[test]
    fn test_get_message_missing_args() {
        let manager = setup_localization();

        // Missing arguments are reported, never a panic
        let message = manager.get_message("meter-found", None);
        assert!(!message.is_empty());
        assert!(message.contains("счётчик найден"));
    }

    #[test]
    fn test_custom_source() {
        let source = "greeting = Hello, { $name }!\nempty =\n    .attr = x\n";
        let manager = LocalizationManager::from_source("en", source).unwrap();

        assert_eq!(
            manager.get_message_with_args("greeting", &[("name", "Ann")]),
            "Hello, Ann!"
        );
        assert!(manager
            .get_message("empty", None)
            .starts_with("Missing value for key:"));
    }

    #[test]
    fn test_invalid_source_is_rejected() {
        assert!(LocalizationManager::from_source("ru", "= broken").is_err());
    }

    #[test]
    fn test_convenience_functions() {
        let message = meter_lookup_bot::localization::t("main-menu");
        assert_eq!(message, "Главное меню");

        let message = meter_lookup_bot::localization::t_args(
            "broadcast-done",
            &[("delivered", "3"), ("failed", "0")],
        );
        assert!(message.contains('3'));
        assert!(message.contains('0'));
    }
}
