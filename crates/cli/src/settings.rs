//! Load test settings: TOML file, then flags and `SIPCONSOLE_*` variables
//!
//! Every file field is optional so a file can carry the stable part of a
//! run (credentials, target) while flags vary the rest.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Deserialize;
use sipconsole_client_core::sim::SimProfile;
use sipconsole_client_core::Credentials;
use sipconsole_load_tester::LoadTestConfig;

/// Looked up under the user config directory when `--config` is not given
const DEFAULT_CONFIG_FILE: &str = "sipconsole/load.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadFile {
    pub target: Option<String>,
    pub concurrency: Option<usize>,
    pub hold_secs: Option<u64>,
    pub auto_hangup: Option<bool>,
    pub answer_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub teardown_timeout_ms: Option<u64>,
    #[serde(default)]
    pub credentials: CredentialsFile,
    /// Simulator profile
    #[serde(default)]
    pub sim: Option<SimProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsFile {
    pub uri: Option<String>,
    pub ws_servers: Option<String>,
    pub auth_user: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Args)]
pub struct LoadArgs {
    /// Load test TOML file
    #[arg(long, env = "SIPCONSOLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Identity URI, e.g. sip:5001@192.168.2.200
    #[arg(long, env = "SIPCONSOLE_URI")]
    pub uri: Option<String>,

    /// WebSocket server, e.g. wss://192.168.2.200:7443
    #[arg(long, env = "SIPCONSOLE_WS_SERVER")]
    pub ws_server: Option<String>,

    #[arg(long, env = "SIPCONSOLE_AUTH_USER")]
    pub auth_user: Option<String>,

    #[arg(long, env = "SIPCONSOLE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "SIPCONSOLE_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Callee URI, e.g. sip:1413@192.168.2.200
    #[arg(short, long, env = "SIPCONSOLE_TARGET")]
    pub target: Option<String>,

    /// Number of concurrent call attempts
    #[arg(short, long, env = "SIPCONSOLE_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Seconds to hold each established call
    #[arg(long, env = "SIPCONSOLE_HOLD_SECS")]
    pub hold_secs: Option<u64>,

    /// Keep established calls up until the run is stopped
    #[arg(long)]
    pub no_auto_hangup: bool,

    #[arg(long)]
    pub answer_timeout_secs: Option<u64>,

    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    #[arg(long)]
    pub teardown_timeout_ms: Option<u64>,

    /// Simulator: probability (0.0-1.0) that a transport refuses to connect
    #[arg(long)]
    pub sim_connect_failure_rate: Option<f64>,

    /// Simulator: probability (0.0-1.0) that the far end rejects a call
    #[arg(long)]
    pub sim_reject_rate: Option<f64>,

    /// Simulator: connect delay range in ms, e.g. 5-50
    #[arg(long, value_parser = parse_ms_range)]
    pub sim_connect_delay_ms: Option<RangeInclusive<u64>>,

    /// Simulator: answer delay range in ms, e.g. 50-500
    #[arg(long, value_parser = parse_ms_range)]
    pub sim_answer_delay_ms: Option<RangeInclusive<u64>>,

    /// Seconds between progress lines
    #[arg(long, default_value_t = 1)]
    pub progress_secs: u64,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse `MIN-MAX` or a single value
pub fn parse_ms_range(value: &str) -> std::result::Result<RangeInclusive<u64>, String> {
    let parse = |s: &str| s.trim().parse::<u64>().map_err(|e| format!("invalid milliseconds '{}': {}", s, e));
    let (min, max) = match value.split_once('-') {
        Some((min, max)) => (parse(min)?, parse(max)?),
        None => {
            let ms = parse(value)?;
            (ms, ms)
        }
    };
    if min > max {
        return Err(format!("range start {} is after its end {}", min, max));
    }
    Ok(min..=max)
}

/// The file to read: `--config` if given, else the default file if present
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let path = dirs::config_dir()?.join(DEFAULT_CONFIG_FILE);
    path.is_file().then_some(path)
}

pub fn load_file(path: &Path) -> Result<LoadFile> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_file(&text).with_context(|| format!("Invalid load test file {}", path.display()))
}

pub fn parse_file(text: &str) -> Result<LoadFile> {
    Ok(toml::from_str(text)?)
}

fn required(value: Option<String>, what: &str, flag: &str, env: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("missing {}: set it in the config file, pass {} or set {}", what, flag, env))
}

/// Merge flags over the file into a run configuration and simulator profile
pub fn resolve(args: &LoadArgs, file: LoadFile) -> Result<(LoadTestConfig, SimProfile)> {
    let creds = file.credentials;
    let mut credentials = Credentials::new(
        required(args.uri.clone().or(creds.uri), "identity URI", "--uri", "SIPCONSOLE_URI")?,
        required(
            args.ws_server.clone().or(creds.ws_servers),
            "WebSocket server",
            "--ws-server",
            "SIPCONSOLE_WS_SERVER",
        )?,
        required(args.auth_user.clone().or(creds.auth_user), "auth user", "--auth-user", "SIPCONSOLE_AUTH_USER")?,
        required(args.password.clone().or(creds.password), "password", "--password", "SIPCONSOLE_PASSWORD")?,
    );
    credentials.display_name = args.display_name.clone().or(creds.display_name);

    let target = required(args.target.clone().or(file.target), "target", "--target", "SIPCONSOLE_TARGET")?;
    let mut config = LoadTestConfig::new(credentials, target);
    if let Some(n) = args.concurrency.or(file.concurrency) {
        config.concurrency = n;
    }
    if let Some(secs) = args.hold_secs.or(file.hold_secs) {
        config.hold_secs = secs;
    }
    if let Some(auto_hangup) = file.auto_hangup {
        config.auto_hangup = auto_hangup;
    }
    if args.no_auto_hangup {
        config.auto_hangup = false;
    }
    config.answer_timeout_secs = args.answer_timeout_secs.or(file.answer_timeout_secs);
    if let Some(secs) = args.connect_timeout_secs.or(file.connect_timeout_secs) {
        config.connect_timeout_secs = secs;
    }
    if let Some(ms) = args.teardown_timeout_ms.or(file.teardown_timeout_ms) {
        config.teardown_timeout_ms = ms;
    }

    let mut profile = file.sim.unwrap_or_default();
    if let Some(rate) = args.sim_connect_failure_rate {
        profile.connect_failure_rate = rate;
    }
    if let Some(rate) = args.sim_reject_rate {
        profile.reject_rate = rate;
    }
    if let Some(range) = args.sim_connect_delay_ms.clone() {
        profile.connect_delay_ms = range;
    }
    if let Some(range) = args.sim_answer_delay_ms.clone() {
        profile.answer_delay_ms = range;
    }
    for (name, rate) in [
        ("sim connect failure rate", profile.connect_failure_rate),
        ("sim reject rate", profile.reject_rate),
    ] {
        if !(0.0..=1.0).contains(&rate) {
            return Err(anyhow!("{} must be between 0.0 and 1.0, got {}", name, rate));
        }
    }

    Ok((config, profile))
}
