use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::filenames::{DEFAULT_LOGGER_ID, DEFAULT_TRANSFER_LAG_DAYS};
use crate::master::MASTER_FILE_NAME;
use crate::quality_filters::FilterDefaults;
use crate::rolling::RollingWindow;
use crate::stages::StageId;
use crate::time_grid::DEFAULT_GRID_INTERVAL_MINUTES;
use crate::transfer::SUMMARIES_CATEGORY;
use crate::units::UnitConversions;

pub const ENV_PREFIX: &str = "FLUXTOWER_";

/// Variables kept in the master series.
pub const DEFAULT_VARIABLES: &[&str] = &[
    "DOY",
    "daytime",
    "H",
    "qc_H",
    "LE",
    "qc_LE",
    "co2_flux",
    "qc_co2_flux",
    "h2o_flux",
    "qc_h2o_flux",
    "co2_molar_density",
    "h2o_molar_density",
    "air_temperature",
    "air_pressure",
    "wind_speed",
    "wind_dir",
    "u*",
    "TKE",
    "L",
    "(z-d)/L",
    "v_var",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub host: String,
    pub login: String,
    pub ssh_key: PathBuf,
    /// Directory on the instrument holding one sub-directory per source category.
    pub remote_data_dir: String,
    pub logger_id: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: "166.248.227.207".to_string(),
            login: "licor".to_string(),
            ssh_key: PathBuf::from("~/.ssh/id_rsa"),
            remote_data_dir: "/home/licor/data".to_string(),
            logger_id: DEFAULT_LOGGER_ID.to_string(),
        }
    }
}

/// Immutable run configuration, built once before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub instrument: InstrumentConfig,
    pub data_dir: PathBuf,
    pub transfer_lag_days: i64,
    /// Contact time assumed when no checkpoint exists; early enough to request everything.
    pub initial_contact: NaiveDateTime,
    pub stages: Vec<String>,
    pub variables: Vec<String>,
    pub grid_interval_minutes: i64,
    pub window: RollingWindow,
    pub filters: FilterDefaults,
    pub units: UnitConversions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentConfig::default(),
            data_dir: PathBuf::from("data"),
            transfer_lag_days: DEFAULT_TRANSFER_LAG_DAYS,
            initial_contact: NaiveDate::from_ymd_opt(2017, 1, 1)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            stages: StageId::DEFAULT_PIPELINE
                .iter()
                .map(|id| id.name().to_string())
                .collect(),
            variables: DEFAULT_VARIABLES.iter().map(|v| v.to_string()).collect(),
            grid_interval_minutes: DEFAULT_GRID_INTERVAL_MINUTES,
            window: RollingWindow::default(),
            filters: FilterDefaults::default(),
            units: UnitConversions::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the optional TOML file, then `FLUXTOWER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| PipelineError::Config(err.to_string()))
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(host) = var("HOST") {
            self.instrument.host = host;
        }
        if let Some(login) = var("LOGIN") {
            self.instrument.login = login;
        }
        if let Some(key) = var("SSH_KEY") {
            self.instrument.ssh_key = PathBuf::from(key);
        }
        if let Some(logger_id) = var("LOGGER_ID") {
            self.instrument.logger_id = logger_id;
        }
        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(lag) = var("TRANSFER_LAG_DAYS") {
            self.transfer_lag_days = lag.parse().map_err(|err| {
                PipelineError::Config(format!("{ENV_PREFIX}TRANSFER_LAG_DAYS '{lag}': {err}"))
            })?;
        }
        if let Some(stages) = var("STAGES") {
            self.stages = stages
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_interval_minutes <= 0 {
            return Err(PipelineError::Config(format!(
                "grid_interval_minutes must be positive, got {}",
                self.grid_interval_minutes
            )));
        }
        if self.transfer_lag_days < 0 {
            return Err(PipelineError::Config(format!(
                "transfer_lag_days must not be negative, got {}",
                self.transfer_lag_days
            )));
        }
        self.window
            .validate()
            .map_err(|err| PipelineError::Config(err.to_string()))
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.data_dir.join(SUMMARIES_CATEGORY)
    }

    pub fn master_path(&self) -> PathBuf {
        self.data_dir.join(MASTER_FILE_NAME)
    }

    pub fn grid_interval(&self) -> Duration {
        Duration::minutes(self.grid_interval_minutes)
    }

    pub fn transfer_lag(&self) -> Duration {
        Duration::days(self.transfer_lag_days)
    }
}
