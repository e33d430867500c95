//! Layered configuration for duct
//!
//! Values are resolved in increasing precedence:
//! built-in defaults < config file < environment < command-line flags.
//!
//! Config files may be written in:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{Outputs, RecordTypes, SessionMode};

/// Log levels accepted by `--log-level`
pub const LOG_LEVELS: &[&str] = &["NONE", "CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG"];

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub output_prefix: String,
    pub sample_interval: f64,
    pub report_interval: f64,
    pub fail_time: f64,
    pub capture_outputs: Outputs,
    pub outputs: Outputs,
    pub record_types: RecordTypes,
    pub mode: SessionMode,
    pub message: String,
    pub clobber: bool,
    pub colors: bool,
    pub summary_format: String,
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            fail_time: DEFAULT_FAIL_TIME,
            capture_outputs: Outputs::All,
            outputs: Outputs::All,
            record_types: RecordTypes::All,
            mode: SessionMode::NewSession,
            message: String::new(),
            clobber: false,
            colors: false,
            summary_format: EXECUTION_SUMMARY_FORMAT.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// A partial set of settings from one source.
///
/// Config files use the same kebab-case keys as the command-line flags.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLayer {
    pub output_prefix: Option<String>,
    pub sample_interval: Option<f64>,
    pub report_interval: Option<f64>,
    pub fail_time: Option<f64>,
    pub capture_outputs: Option<Outputs>,
    pub outputs: Option<Outputs>,
    pub record_types: Option<RecordTypes>,
    pub mode: Option<SessionMode>,
    pub message: Option<String>,
    pub clobber: Option<bool>,
    pub colors: Option<bool>,
    pub summary_format: Option<String>,
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Load a layer from a config file, detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => Ok(toml::from_str(content)?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::config(format!("JSON parse error: {}", e))),
        }
    }

    /// Build a layer from `DUCT_*` variables
    pub fn from_env(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        Ok(Self {
            output_prefix: vars.get("DUCT_OUTPUT_PREFIX").cloned(),
            sample_interval: get("DUCT_SAMPLE_INTERVAL")
                .map(|v| parse_number("DUCT_SAMPLE_INTERVAL", v))
                .transpose()?,
            report_interval: get("DUCT_REPORT_INTERVAL")
                .map(|v| parse_number("DUCT_REPORT_INTERVAL", v))
                .transpose()?,
            fail_time: get("DUCT_FAIL_TIME")
                .map(|v| parse_number("DUCT_FAIL_TIME", v))
                .transpose()?,
            capture_outputs: get("DUCT_CAPTURE_OUTPUTS").map(Outputs::from_str).transpose()?,
            outputs: get("DUCT_OUTPUTS").map(Outputs::from_str).transpose()?,
            record_types: get("DUCT_RECORD_TYPES")
                .map(RecordTypes::from_str)
                .transpose()?,
            mode: get("DUCT_MODE").map(SessionMode::from_str).transpose()?,
            message: vars.get("DUCT_MESSAGE").cloned(),
            clobber: get("DUCT_CLOBBER").map(bool_from_str).transpose()?,
            colors: get("DUCT_COLORS").map(bool_from_str).transpose()?,
            summary_format: vars.get("DUCT_SUMMARY_FORMAT").cloned(),
            log_level: get("DUCT_LOG_LEVEL").map(str::to_string),
        })
    }
}

impl RunConfig {
    /// Overlay every value the layer sets
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(v) = layer.output_prefix {
            self.output_prefix = v;
        }
        if let Some(v) = layer.sample_interval {
            self.sample_interval = v;
        }
        if let Some(v) = layer.report_interval {
            self.report_interval = v;
        }
        if let Some(v) = layer.fail_time {
            self.fail_time = v;
        }
        if let Some(v) = layer.capture_outputs {
            self.capture_outputs = v;
        }
        if let Some(v) = layer.outputs {
            self.outputs = v;
        }
        if let Some(v) = layer.record_types {
            self.record_types = v;
        }
        if let Some(v) = layer.mode {
            self.mode = v;
        }
        if let Some(v) = layer.message {
            self.message = v;
        }
        if let Some(v) = layer.clobber {
            self.clobber = v;
        }
        if let Some(v) = layer.colors {
            self.colors = v;
        }
        if let Some(v) = layer.summary_format {
            self.summary_format = v;
        }
        if let Some(v) = layer.log_level {
            self.log_level = v;
        }
    }

    /// Merge layers over the defaults and validate the result
    pub fn resolve(file: Option<ConfigLayer>, env: ConfigLayer, cli: ConfigLayer) -> Result<Self> {
        let mut config = Self::default();
        if let Some(file) = file {
            config.apply(file);
        }
        config.apply(env);
        config.apply(cli);
        config.log_level = config.log_level.to_uppercase();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive("sample-interval", self.sample_interval)?;
        validate_positive("report-interval", self.report_interval)?;
        validate_sample_report_interval(self.sample_interval, self.report_interval)?;
        if !self.fail_time.is_finite() {
            return Err(Error::config("fail-time must be a finite number"));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            return Err(Error::InvalidChoice {
                option: "log-level",
                value: self.log_level.clone(),
                expected: "NONE, CRITICAL, ERROR, WARNING, INFO, DEBUG",
            });
        }
        Ok(())
    }
}

pub fn validate_positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::config(format!("{} must be greater than 0, got {}", name, value)))
    }
}

pub fn validate_sample_report_interval(sample_interval: f64, report_interval: f64) -> Result<()> {
    if report_interval < sample_interval {
        return Err(Error::config(format!(
            "report-interval must be greater than or equal to sample-interval ({} < {})",
            report_interval, sample_interval
        )));
    }
    Ok(())
}

/// Parse true/yes/1 and false/no/0, case-insensitively
pub fn bool_from_str(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::config(format!("Cannot interpret '{}' as a boolean", value))),
    }
}

fn parse_number(name: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| Error::config(format!("{} must be a number, got '{}'", name, value)))
}

/// Locate the config file to use.
///
/// An explicit path (flag or `DUCT_CONFIG`) must exist; otherwise the user
/// config directory is searched and a missing file is not an error.
pub fn find_config_file(explicit: Option<&Path>, search_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(dir) = search_dir {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.exists() {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

/// Environment as seen by duct: dotenv files named in `DUCT_CONFIG_PATHS`
/// supply defaults, and the real process environment wins over them.
/// Later files override earlier ones.
pub fn load_env(process_env: HashMap<String, String>) -> Result<HashMap<String, String>> {
    let mut merged = HashMap::new();

    if let Some(paths) = process_env.get(CONFIG_PATHS_ENV) {
        for path in paths.split(':').filter(|p| !p.is_empty()) {
            let path = Path::new(path);
            if !path.exists() {
                continue;
            }
            let iter = dotenvy::from_path_iter(path)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
            for item in iter {
                let (key, value) =
                    item.map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
                merged.insert(key, value);
            }
        }
    }

    merged.extend(process_env);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_format_detection() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("yaml"), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_extension("yml"), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("txt"), None);
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::resolve(None, ConfigLayer::default(), ConfigLayer::default()).unwrap();
        assert_eq!(config.sample_interval, 1.0);
        assert_eq!(config.report_interval, 60.0);
        assert_eq!(config.fail_time, 3.0);
        assert_eq!(config.capture_outputs, Outputs::All);
        assert_eq!(config.mode, SessionMode::NewSession);
        assert_eq!(config.message, "");
        assert_eq!(config.log_level, "INFO");
    }

    #[test]
    fn test_config_parse_toml() {
        let config_content = r#"
sample-interval = 0.25
report-interval = 5.0
capture-outputs = "stdout"
record-types = "processes-samples"
mode = "current-session"
message = "nightly build"
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let layer = ConfigLayer::load(file.path()).unwrap();
        assert_eq!(layer.sample_interval, Some(0.25));
        assert_eq!(layer.capture_outputs, Some(Outputs::Stdout));
        assert_eq!(layer.record_types, Some(RecordTypes::ProcessesSamples));
        assert_eq!(layer.mode, Some(SessionMode::CurrentSession));
        assert_eq!(layer.message.as_deref(), Some("nightly build"));
    }

    #[test]
    fn test_config_parse_yaml_and_json() {
        let yaml = ConfigLayer::parse("fail-time: -1\nclobber: true\n", ConfigFormat::Yaml).unwrap();
        assert_eq!(yaml.fail_time, Some(-1.0));
        assert_eq!(yaml.clobber, Some(true));

        let json = ConfigLayer::parse(r#"{"outputs": "none", "colors": true}"#, ConfigFormat::Json).unwrap();
        assert_eq!(json.outputs, Some(Outputs::None));
        assert_eq!(json.colors, Some(true));
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        let err = ConfigLayer::parse("sample_rate = 2.0\n", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, Error::TomlError(_)));
    }

    #[test]
    fn test_config_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".ini").unwrap();
        let err = ConfigLayer::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported config file extension"));
    }

    #[test]
    fn test_env_layer() {
        let layer = ConfigLayer::from_env(&env(&[
            ("DUCT_SAMPLE_INTERVAL", "3.0"),
            ("DUCT_REPORT_INTERVAL", "180.0"),
            ("DUCT_MESSAGE", "env message"),
            ("DUCT_LOG_LEVEL", "warning"),
            ("DUCT_CLOBBER", "yes"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();
        assert_eq!(layer.sample_interval, Some(3.0));
        assert_eq!(layer.report_interval, Some(180.0));
        assert_eq!(layer.message.as_deref(), Some("env message"));
        assert_eq!(layer.clobber, Some(true));

        let config = RunConfig::resolve(None, layer, ConfigLayer::default()).unwrap();
        assert_eq!(config.log_level, "WARNING");
    }

    #[test]
    fn test_env_layer_rejects_bad_values() {
        assert!(ConfigLayer::from_env(&env(&[("DUCT_SAMPLE_INTERVAL", "fast")])).is_err());
        assert!(ConfigLayer::from_env(&env(&[("DUCT_CAPTURE_OUTPUTS", "both")])).is_err());
        assert!(ConfigLayer::from_env(&env(&[("DUCT_COLORS", "maybe")])).is_err());
    }

    #[test]
    fn test_precedence() {
        let file = ConfigLayer {
            sample_interval: Some(10.0),
            report_interval: Some(100.0),
            message: Some("file message".into()),
            log_level: Some("ERROR".into()),
            ..Default::default()
        };
        let env_layer = ConfigLayer {
            sample_interval: Some(15.0),
            message: Some("env message".into()),
            ..Default::default()
        };
        let cli = ConfigLayer {
            sample_interval: Some(20.0),
            ..Default::default()
        };

        let config = RunConfig::resolve(Some(file.clone()), ConfigLayer::default(), ConfigLayer::default()).unwrap();
        assert_eq!(config.sample_interval, 10.0);
        assert_eq!(config.message, "file message");

        let config = RunConfig::resolve(Some(file.clone()), env_layer.clone(), ConfigLayer::default()).unwrap();
        assert_eq!(config.sample_interval, 15.0);
        assert_eq!(config.message, "env message");
        assert_eq!(config.log_level, "ERROR");

        let config = RunConfig::resolve(Some(file), env_layer, cli).unwrap();
        assert_eq!(config.sample_interval, 20.0);
        assert_eq!(config.report_interval, 100.0);
    }

    #[test]
    fn test_sample_interval_above_report_interval_rejected() {
        let cli = ConfigLayer {
            sample_interval: Some(5.0),
            report_interval: Some(4.0),
            ..Default::default()
        };
        let err = RunConfig::resolve(None, ConfigLayer::default(), cli).unwrap_err();
        assert!(err
            .to_string()
            .contains("report-interval must be greater than or equal to sample-interval"));
        assert_eq!(err.exit_code(), 2);

        assert!(validate_sample_report_interval(2.0, 2.0).is_ok());
        assert!(validate_sample_report_interval(0.5, 1.0).is_ok());
    }

    #[test]
    fn test_validate_positive() {
        assert_eq!(validate_positive("x", 0.5).unwrap(), 0.5);
        assert!(validate_positive("x", 0.0).unwrap_err().to_string().contains("must be greater than 0"));
        assert!(validate_positive("x", -1.0).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let cli = ConfigLayer {
            log_level: Some("verbose".into()),
            ..Default::default()
        };
        assert!(RunConfig::resolve(None, ConfigLayer::default(), cli).is_err());
    }

    #[test]
    fn test_bool_from_str() {
        for v in ["true", "True", "YES", "1"] {
            assert!(bool_from_str(v).unwrap());
        }
        for v in ["false", "No", "0"] {
            assert!(!bool_from_str(v).unwrap());
        }
        assert!(bool_from_str("maybe").is_err());
        assert!(bool_from_str("").is_err());
    }

    #[test]
    fn test_find_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_config_file(None, Some(dir.path())).unwrap(), None);

        std::fs::write(dir.path().join("duct.yaml"), "message: hi\n").unwrap();
        assert_eq!(
            find_config_file(None, Some(dir.path())).unwrap(),
            Some(dir.path().join("duct.yaml"))
        );

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            find_config_file(Some(&missing), None),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_load_env_dotenv_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.env");
        let user = dir.path().join("user.env");
        std::fs::write(&system, "DUCT_LOG_LEVEL=WARNING\nDUCT_SAMPLE_INTERVAL=2.0\n").unwrap();
        std::fs::write(&user, "DUCT_LOG_LEVEL=DEBUG\nDUCT_REPORT_INTERVAL=120.0\n").unwrap();

        let paths = format!("{}:{}", system.display(), user.display());
        let merged = load_env(env(&[(CONFIG_PATHS_ENV, &paths)])).unwrap();
        assert_eq!(merged.get("DUCT_LOG_LEVEL").map(String::as_str), Some("DEBUG"));
        assert_eq!(merged.get("DUCT_SAMPLE_INTERVAL").map(String::as_str), Some("2.0"));
        assert_eq!(merged.get("DUCT_REPORT_INTERVAL").map(String::as_str), Some("120.0"));

        let merged = load_env(env(&[(CONFIG_PATHS_ENV, &paths), ("DUCT_LOG_LEVEL", "CRITICAL")])).unwrap();
        assert_eq!(merged.get("DUCT_LOG_LEVEL").map(String::as_str), Some("CRITICAL"));
    }
}
