use crate::error::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Time budgets for the external commands the engine waits on.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeouts {
    /// `uiautomator dump` on the device.
    pub dump: Duration,
    /// Reading the dumped file back.
    pub dump_read: Duration,
    pub screenshot: Duration,
    /// One text-recognition pass.
    pub ocr: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dump: Duration::from_secs(10),
            dump_read: Duration::from_secs(5),
            screenshot: Duration::from_secs(10),
            ocr: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub adb_path: String,
    pub default_device: Option<String>,
    pub timeouts: Timeouts,
    pub tap_delay: Duration,
    /// `auto` mode falls back to optical below this many tree elements.
    pub min_tree_elements: usize,
    pub tesseract_path: String,
    pub ocr_lang: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            default_device: None,
            timeouts: Timeouts::default(),
            tap_delay: Duration::from_secs(1),
            min_tree_elements: 1,
            tesseract_path: "tesseract".to_string(),
            ocr_lang: "eng".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, defaults filling gaps.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let secs = |key: &str, fallback: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => {
                    let value: f64 = parse_var(key, &raw)?;
                    Duration::try_from_secs_f64(value).map_err(|_| {
                        AppError::config(format!("{key} must be a non-negative number of seconds"))
                    })
                }
                None => Ok(fallback),
            }
        };

        let timeouts = Timeouts {
            dump: secs("UI_TARGET_DUMP_TIMEOUT_SECS", defaults.timeouts.dump)?,
            dump_read: secs("UI_TARGET_DUMP_READ_TIMEOUT_SECS", defaults.timeouts.dump_read)?,
            screenshot: secs("UI_TARGET_SCREENSHOT_TIMEOUT_SECS", defaults.timeouts.screenshot)?,
            ocr: secs("UI_TARGET_OCR_TIMEOUT_SECS", defaults.timeouts.ocr)?,
        };

        let min_tree_elements = match lookup("UI_TARGET_MIN_TREE_ELEMENTS") {
            Some(raw) => parse_var("UI_TARGET_MIN_TREE_ELEMENTS", &raw)?,
            None => defaults.min_tree_elements,
        };

        Ok(Self {
            adb_path: lookup("UI_TARGET_ADB_PATH").unwrap_or(defaults.adb_path),
            default_device: lookup("UI_TARGET_DEVICE").filter(|d| !d.trim().is_empty()),
            timeouts,
            tap_delay: secs("UI_TARGET_TAP_DELAY_SECS", defaults.tap_delay)?,
            min_tree_elements,
            tesseract_path: lookup("UI_TARGET_TESSERACT_PATH").unwrap_or(defaults.tesseract_path),
            ocr_lang: lookup("UI_TARGET_OCR_LANG").unwrap_or(defaults.ocr_lang),
        })
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::config(format!("{key} has invalid value '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.adb_path, "adb");
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(config.min_tree_elements, 1);
        assert!(config.default_device.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("UI_TARGET_DUMP_TIMEOUT_SECS", "2.5"),
            ("UI_TARGET_MIN_TREE_ELEMENTS", "3"),
            ("UI_TARGET_DEVICE", "emulator-5554"),
            ("UI_TARGET_OCR_LANG", "chi_sim"),
        ]))
        .unwrap();
        assert_eq!(config.timeouts.dump, Duration::from_millis(2500));
        assert_eq!(config.min_tree_elements, 3);
        assert_eq!(config.default_device.as_deref(), Some("emulator-5554"));
        assert_eq!(config.ocr_lang, "chi_sim");
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = Config::from_lookup(lookup_from(&[("UI_TARGET_SCREENSHOT_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        let err = Config::from_lookup(lookup_from(&[("UI_TARGET_TAP_DELAY_SECS", "-1")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
