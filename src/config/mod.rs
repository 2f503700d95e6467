use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::permissions::DEFAULT_SOFT_THRESHOLD;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub cloud: CloudConfig,
    pub dispatch: DispatchConfig,
    pub gate: GateConfig,
    pub ui: UiConfig,
    pub logs: LogsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloudConfig {
    pub cli: String,
    pub target_flag: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateConfig {
    pub soft_threshold: u32,
    pub hard_minimum: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsConfig {
    pub enabled: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            cloud: CloudConfig {
                cli: "gcloud".to_string(),
                target_flag: "--project".to_string(),
            },
            dispatch: DispatchConfig { timeout_secs: 60 },
            gate: GateConfig {
                soft_threshold: DEFAULT_SOFT_THRESHOLD,
                hard_minimum: 0,
            },
            ui: UiConfig {
                color: true,
                max_table_rows: 50,
            },
            logs: LogsConfig { enabled: true },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    cloud: Option<RawCloudConfig>,
    dispatch: Option<RawDispatchConfig>,
    gate: Option<RawGateConfig>,
    ui: Option<RawUiConfig>,
    logs: Option<RawLogsConfig>,
}

#[derive(Debug, Deserialize)]
struct RawCloudConfig {
    cli: Option<String>,
    target_flag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDispatchConfig {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawGateConfig {
    soft_threshold: Option<u32>,
    hard_minimum: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawLogsConfig {
    enabled: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/cloudassess/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let explicit = config_path.is_some();
    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    } else if explicit {
        anyhow::bail!("config file not found: {}", path.display());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(cloud) = raw.cloud {
        if let Some(cli) = cloud.cli {
            cfg.cloud.cli = cli;
        }
        if let Some(target_flag) = cloud.target_flag {
            cfg.cloud.target_flag = target_flag;
        }
    }

    if let Some(dispatch) = raw.dispatch {
        if let Some(timeout_secs) = dispatch.timeout_secs {
            cfg.dispatch.timeout_secs = timeout_secs;
        }
    }

    if let Some(gate) = raw.gate {
        if let Some(soft_threshold) = gate.soft_threshold {
            cfg.gate.soft_threshold = soft_threshold;
        }
        if let Some(hard_minimum) = gate.hard_minimum {
            cfg.gate.hard_minimum = hard_minimum;
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(logs) = raw.logs {
        if let Some(enabled) = logs.enabled {
            cfg.logs.enabled = enabled;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("CLOUDASSESS_CLOUD_CLI") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.cloud.cli = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_CLOUD_TARGET_FLAG") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.cloud.target_flag = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_DISPATCH_TIMEOUT_SECS") {
        cfg.dispatch.timeout_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "CLOUDASSESS_DISPATCH_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_GATE_SOFT_THRESHOLD") {
        cfg.gate.soft_threshold = v
            .trim()
            .parse::<u32>()
            .with_context(|| "CLOUDASSESS_GATE_SOFT_THRESHOLD")?;
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_GATE_HARD_MINIMUM") {
        cfg.gate.hard_minimum = v
            .trim()
            .parse::<u32>()
            .with_context(|| "CLOUDASSESS_GATE_HARD_MINIMUM")?;
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "CLOUDASSESS_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .with_context(|| "CLOUDASSESS_UI_MAX_TABLE_ROWS")?;
    }
    if let Ok(v) = std::env::var("CLOUDASSESS_LOGS_ENABLED") {
        cfg.logs.enabled = parse_bool(&v).with_context(|| "CLOUDASSESS_LOGS_ENABLED")?;
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.gate.soft_threshold > 100 || cfg.gate.hard_minimum > 100 {
        anyhow::bail!("gate thresholds must be within 0..=100");
    }
    if cfg.gate.hard_minimum > cfg.gate.soft_threshold {
        anyhow::bail!(
            "gate.hard_minimum ({}) must not exceed gate.soft_threshold ({})",
            cfg.gate.hard_minimum,
            cfg.gate.soft_threshold
        );
    }
    if cfg.dispatch.timeout_secs == 0 {
        anyhow::bail!("dispatch.timeout_secs must be greater than 0");
    }
    if !cfg.cloud.target_flag.starts_with("--") {
        anyhow::bail!(
            "cloud.target_flag must be a long option (e.g. --project): {}",
            cfg.cloud.target_flag
        );
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}
