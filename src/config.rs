use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::canonical::CanonLimits;
use crate::editor::EditPolicy;
use crate::grouping::binning::DEFAULT_BIN_WIDTH;
use crate::grouping::{BinningKind, TemperatureBinning};

const DEFAULT_HTTP_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8087);
const DEFAULT_CLASSIFIER_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 25;
const MAX_CLASSIFIER_TIMEOUT_SECS: u64 = 300;

/// Connection settings for the external classifier.
#[derive(Clone)]
pub struct ClassifierSettings {
    pub endpoint: String,
    pub model: String,
    /// Absent keys are reported per request as `config-missing`.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ClassifierSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierSettings")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_bind_address: SocketAddr,
    pub classifier: ClassifierSettings,
    pub limits: CanonLimits,
    pub temperature_binning: BinningKind,
    pub temperature_bin_width: f64,
    pub edit_policy: EditPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_bind_address: DEFAULT_HTTP_BIND,
            classifier: ClassifierSettings::default(),
            limits: CanonLimits::default(),
            temperature_binning: BinningKind::default(),
            temperature_bin_width: DEFAULT_BIN_WIDTH,
            edit_policy: EditPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Merge CLI/env values over the optional config file over defaults.
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            http_bind: cli_http_bind,
            classifier_endpoint: cli_endpoint,
            classifier_model: cli_model,
            api_key: cli_api_key,
            classifier_timeout_secs: cli_timeout,
            max_values: cli_max_values,
            max_value_len: cli_max_value_len,
            max_label_len: cli_max_label_len,
            max_notes_len: cli_max_notes_len,
            max_uncertainties: cli_max_uncertainties,
            max_uncertainty_len: cli_max_uncertainty_len,
            temperature_binning: cli_binning,
            temperature_bin_width: cli_bin_width,
            edit_policy: cli_edit_policy,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            http_bind: file_http_bind,
            classifier_endpoint: file_endpoint,
            classifier_model: file_model,
            classifier_api_key: file_api_key,
            classifier_timeout_secs: file_timeout,
            max_values: file_max_values,
            max_value_len: file_max_value_len,
            max_label_len: file_max_label_len,
            max_notes_len: file_max_notes_len,
            max_uncertainties: file_max_uncertainties,
            max_uncertainty_len: file_max_uncertainty_len,
            temperature_binning: file_binning,
            temperature_bin_width: file_bin_width,
            edit_policy: file_edit_policy,
        } = file_config;

        let defaults = CanonLimits::default();
        let limits = CanonLimits {
            max_values: cli_max_values
                .or(file_max_values)
                .unwrap_or(defaults.max_values),
            max_value_len: cli_max_value_len
                .or(file_max_value_len)
                .unwrap_or(defaults.max_value_len),
            max_label_len: cli_max_label_len
                .or(file_max_label_len)
                .unwrap_or(defaults.max_label_len),
            max_notes_len: cli_max_notes_len
                .or(file_max_notes_len)
                .unwrap_or(defaults.max_notes_len),
            max_uncertainties: cli_max_uncertainties
                .or(file_max_uncertainties)
                .unwrap_or(defaults.max_uncertainties),
            max_uncertainty_len: cli_max_uncertainty_len
                .or(file_max_uncertainty_len)
                .unwrap_or(defaults.max_uncertainty_len),
        };

        let api_key = cli_api_key
            .or(file_api_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let classifier = ClassifierSettings {
            endpoint: cli_endpoint
                .or(file_endpoint)
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_ENDPOINT.to_string()),
            model: cli_model
                .or(file_model)
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
            api_key,
            timeout: Duration::from_secs(
                cli_timeout
                    .or(file_timeout)
                    .unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
            ),
        };

        Ok(Self {
            http_bind_address: cli_http_bind.or(file_http_bind).unwrap_or(DEFAULT_HTTP_BIND),
            classifier,
            limits,
            temperature_binning: cli_binning.or(file_binning).unwrap_or_default(),
            temperature_bin_width: cli_bin_width
                .or(file_bin_width)
                .unwrap_or(DEFAULT_BIN_WIDTH),
            edit_policy: cli_edit_policy.or(file_edit_policy).unwrap_or_default(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        let timeout = self.classifier.timeout.as_secs();
        anyhow::ensure!(
            (1..=MAX_CLASSIFIER_TIMEOUT_SECS).contains(&timeout),
            "classifier timeout must be between 1 and {MAX_CLASSIFIER_TIMEOUT_SECS} seconds (got {timeout})"
        );
        anyhow::ensure!(
            self.temperature_bin_width.is_finite() && self.temperature_bin_width > 0.0,
            "temperature bin width must be a positive number (got {})",
            self.temperature_bin_width
        );
        anyhow::ensure!(
            !self.classifier.endpoint.trim().is_empty(),
            "classifier endpoint must not be empty"
        );
        Ok(())
    }

    pub fn binning(&self) -> TemperatureBinning {
        TemperatureBinning::from_kind(self.temperature_binning, self.temperature_bin_width)
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "factor-canon",
    about = "Metadata canonicalization and experiment grouping service",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "FACTOR_CANON_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "FACTOR_CANON_CLASSIFIER_ENDPOINT",
        value_name = "URL",
        help = "OpenAI-compatible chat-completions endpoint"
    )]
    pub classifier_endpoint: Option<String>,

    #[arg(
        long,
        env = "FACTOR_CANON_CLASSIFIER_MODEL",
        value_name = "MODEL",
        help = "Model name sent to the classifier"
    )]
    pub classifier_model: Option<String>,

    #[arg(
        long,
        env = "FACTOR_CANON_API_KEY",
        value_name = "KEY",
        hide_env_values = true,
        help = "Bearer credential for the classifier"
    )]
    pub api_key: Option<String>,

    #[arg(
        long,
        env = "FACTOR_CANON_CLASSIFIER_TIMEOUT_SECS",
        value_name = "SECS",
        help = "Upper bound on one classifier call",
        value_parser = clap::value_parser!(u64)
    )]
    pub classifier_timeout_secs: Option<u64>,

    #[arg(long, env = "FACTOR_CANON_MAX_VALUES", value_name = "N")]
    pub max_values: Option<usize>,

    #[arg(long, env = "FACTOR_CANON_MAX_VALUE_LEN", value_name = "CHARS")]
    pub max_value_len: Option<usize>,

    #[arg(long, env = "FACTOR_CANON_MAX_LABEL_LEN", value_name = "CHARS")]
    pub max_label_len: Option<usize>,

    #[arg(long, env = "FACTOR_CANON_MAX_NOTES_LEN", value_name = "CHARS")]
    pub max_notes_len: Option<usize>,

    #[arg(long, env = "FACTOR_CANON_MAX_UNCERTAINTIES", value_name = "N")]
    pub max_uncertainties: Option<usize>,

    #[arg(long, env = "FACTOR_CANON_MAX_UNCERTAINTY_LEN", value_name = "CHARS")]
    pub max_uncertainty_len: Option<usize>,

    #[arg(
        long,
        env = "FACTOR_CANON_TEMPERATURE_BINNING",
        value_enum,
        value_name = "SCHEME",
        help = "Temperature binning scheme (bands or interval)"
    )]
    pub temperature_binning: Option<BinningKind>,

    #[arg(
        long,
        env = "FACTOR_CANON_TEMPERATURE_BIN_WIDTH",
        value_name = "DEGREES",
        help = "Bin width for the interval scheme"
    )]
    pub temperature_bin_width: Option<f64>,

    #[arg(
        long,
        env = "FACTOR_CANON_EDIT_POLICY",
        value_enum,
        value_name = "POLICY",
        help = "How the group editor treats invalid references (lenient or strict)"
    )]
    pub edit_policy: Option<EditPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    http_bind: Option<SocketAddr>,
    classifier_endpoint: Option<String>,
    classifier_model: Option<String>,
    classifier_api_key: Option<String>,
    classifier_timeout_secs: Option<u64>,
    max_values: Option<usize>,
    max_value_len: Option<usize>,
    max_label_len: Option<usize>,
    max_notes_len: Option<usize>,
    max_uncertainties: Option<usize>,
    max_uncertainty_len: Option<usize>,
    temperature_binning: Option<BinningKind>,
    temperature_bin_width: Option<f64>,
    edit_policy: Option<EditPolicy>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
