use crate::args::Args;
use crate::kiosk::*;

use std::fs;
use std::path::{Path, PathBuf};

use attendance_core::{AttendanceLayout, KioskRules, SystemClock};
use chrono::NaiveTime;
use chrono_tz::Tz;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub const DEFAULT_WORKBOOK_PATH: &str = "data/attendance.xlsx";

/// The JSON settings file. Every field is optional.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(rename = "workbookPath")]
    pub workbook_path: Option<String>,
    pub layout: Option<String>,
    pub timezone: Option<String>,
    #[serde(rename = "lateCutoff")]
    pub late_cutoff: Option<String>,
    #[serde(rename = "suggestionLimit")]
    pub suggestion_limit: Option<usize>,
    #[serde(rename = "suggestionThreshold")]
    pub suggestion_threshold: Option<f64>,
}

impl KioskConfig {
    /// Command line values win over the ones of the file.
    pub fn with_args(self, args: &Args) -> KioskConfig {
        KioskConfig {
            workbook_path: args.workbook.clone().or(self.workbook_path),
            layout: args.layout.clone().or(self.layout),
            timezone: args.timezone.clone().or(self.timezone),
            late_cutoff: args.late_cutoff.clone().or(self.late_cutoff),
            ..self
        }
    }
}

/// Everything needed to open the kiosk, once validated.
#[derive(PartialEq, Debug, Clone)]
pub struct Settings {
    pub workbook_path: PathBuf,
    pub timezone: Tz,
    pub rules: KioskRules,
}

/// Reads a settings file. A relative workbook path in the file is taken
/// relative to the directory of the file.
pub fn read_config(path: &str) -> CliResult<KioskConfig> {
    let config_str = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: KioskConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    let root_p = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
    if let Some(wp) = config.workbook_path.clone() {
        if Path::new(&wp).is_relative() {
            config.workbook_path = Some(root_p.join(wp).display().to_string());
        }
    }
    Ok(config)
}

pub fn validate_config(config: &KioskConfig) -> CliResult<Settings> {
    let defaults = KioskRules::default();
    let layout = match config.layout.as_deref().map(|s| s.trim().to_lowercase()) {
        None => defaults.layout,
        Some(s) if s == "matrix" => AttendanceLayout::Matrix,
        Some(s) if s == "daily" => AttendanceLayout::DailySheet,
        Some(s) => whatever!("Unknown layout {:?}: expected daily or matrix", s),
    };
    let timezone = match config.timezone.as_deref() {
        None => SystemClock::DEFAULT_TIMEZONE,
        Some(s) => match s.trim().parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => whatever!("Unknown timezone {:?}", s),
        },
    };
    let late_cutoff = match config.late_cutoff.as_deref() {
        None => defaults.late_cutoff,
        Some(s) => match parse_cutoff(s) {
            Some(t) => t,
            None => whatever!("Failed to understand late cutoff {:?}: expected HH:MM", s),
        },
    };
    let suggestion_limit = match config.suggestion_limit {
        None => defaults.suggestion_limit,
        Some(0) => whatever!("suggestionLimit must be at least 1"),
        Some(x) => x,
    };
    let suggestion_threshold = match config.suggestion_threshold {
        None => defaults.suggestion_threshold,
        Some(x) if (0.0..=1.0).contains(&x) => x,
        Some(x) => whatever!("suggestionThreshold must be between 0 and 1, got {}", x),
    };
    let workbook_path = PathBuf::from(
        config
            .workbook_path
            .clone()
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PATH.to_string()),
    );
    Ok(Settings {
        workbook_path,
        timezone,
        rules: KioskRules {
            layout,
            late_cutoff,
            suggestion_limit,
            suggestion_threshold,
        },
    })
}

fn parse_cutoff(s: &str) -> Option<NaiveTime> {
    let t = s.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config() {
        let settings = validate_config(&KioskConfig::default()).unwrap();
        assert_eq!(settings.workbook_path, PathBuf::from("data/attendance.xlsx"));
        assert_eq!(settings.timezone, chrono_tz::America::Edmonton);
        assert_eq!(settings.rules, KioskRules::default());
    }

    #[test]
    fn reads_camel_case_keys() {
        let config: KioskConfig = serde_json::from_str(
            r#"{"layout": "daily", "timezone": "America/Toronto", "lateCutoff": "09:05",
                "suggestionLimit": 3, "suggestionThreshold": 0.8}"#,
        )
        .unwrap();
        let settings = validate_config(&config).unwrap();
        assert_eq!(settings.rules.layout, AttendanceLayout::DailySheet);
        assert_eq!(settings.timezone, chrono_tz::America::Toronto);
        assert_eq!(
            settings.rules.late_cutoff,
            NaiveTime::from_hms_opt(9, 5, 0).unwrap()
        );
        assert_eq!(settings.rules.suggestion_limit, 3);
        assert_eq!(settings.rules.suggestion_threshold, 0.8);
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            KioskConfig {
                layout: Some("weekly".to_string()),
                ..KioskConfig::default()
            },
            KioskConfig {
                timezone: Some("Mars/Olympus".to_string()),
                ..KioskConfig::default()
            },
            KioskConfig {
                late_cutoff: Some("quarter past ten".to_string()),
                ..KioskConfig::default()
            },
            KioskConfig {
                suggestion_limit: Some(0),
                ..KioskConfig::default()
            },
            KioskConfig {
                suggestion_threshold: Some(1.5),
                ..KioskConfig::default()
            },
        ];
        for config in bad.iter() {
            assert!(validate_config(config).is_err(), "{:?}", config);
        }
    }

    #[test]
    fn args_override_the_file() {
        let config = KioskConfig {
            layout: Some("matrix".to_string()),
            workbook_path: Some("from_file.xlsx".to_string()),
            ..KioskConfig::default()
        };
        let args = Args {
            layout: Some("daily".to_string()),
            ..Args::default()
        };
        let merged = config.with_args(&args);
        assert_eq!(merged.layout.as_deref(), Some("daily"));
        assert_eq!(merged.workbook_path.as_deref(), Some("from_file.xlsx"));
    }

    #[test]
    fn relative_workbook_path_follows_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("kiosk.json");
        fs::write(&config_path, r#"{"workbookPath": "book.xlsx"}"#).unwrap();
        let config = read_config(&config_path.display().to_string()).unwrap();
        assert_eq!(
            config.workbook_path,
            Some(dir.path().join("book.xlsx").display().to_string())
        );
    }
}
