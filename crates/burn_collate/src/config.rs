//! Loader and collation settings from `burn-collate.toml` plus env overrides.

use std::path::{Path, PathBuf};

use data_contracts::FieldPolicies;
use serde::Deserialize;

use crate::bundle::FormatBundle;
use crate::types::{CollateError, CollateResult};

const DEFAULT_CONFIG_NAME: &str = "burn-collate.toml";
pub(crate) const DEFAULT_LOG_EVERY_BATCHES: usize = 100;

pub const CONFIG_ENV: &str = "BURN_COLLATE_CONFIG";
pub const SAMPLES_PER_GPU_ENV: &str = "BURN_COLLATE_SAMPLES_PER_GPU";
pub const LOG_EVERY_ENV: &str = "BURN_COLLATE_LOG_EVERY";

#[derive(Debug, Clone)]
pub struct CollateConfig {
    /// Samples merged into one sub-batch (one device's share).
    pub samples_per_gpu: usize,
    /// Devices per step; a loader batch holds `samples_per_gpu * num_gpus` samples.
    pub num_gpus: usize,
    /// Shuffle sample order every epoch.
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Drop the last incomplete batch.
    pub drop_last: bool,
    /// Log loader progress every N batches; None disables.
    pub log_every: Option<usize>,
    /// Batching policy per sample field.
    pub fields: FieldPolicies,
}

impl Default for CollateConfig {
    fn default() -> Self {
        Self {
            samples_per_gpu: 1,
            num_gpus: 1,
            shuffle: false,
            seed: None,
            drop_last: false,
            log_every: Some(DEFAULT_LOG_EVERY_BATCHES),
            fields: FieldPolicies::detection_defaults(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct CollateConfigFile {
    samples_per_gpu: Option<usize>,
    num_gpus: Option<usize>,
    shuffle: Option<bool>,
    seed: Option<u64>,
    drop_last: Option<bool>,
    log_every: Option<usize>,
    fields: Option<FieldPolicies>,
}

impl CollateConfig {
    /// Reads `$BURN_COLLATE_CONFIG`, else `burn-collate.toml` in the working
    /// directory, else defaults; env overrides are applied last.
    pub fn load() -> CollateResult<Self> {
        let cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(Path::new(&path))?,
            _ => {
                let path = Path::new(DEFAULT_CONFIG_NAME);
                if path.exists() {
                    Self::from_path(path)?
                } else {
                    Self::default()
                }
            }
        };
        let cfg = cfg.with_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> CollateResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| CollateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parses TOML text; `origin` only labels errors.
    pub fn parse(raw: &str, origin: &Path) -> CollateResult<Self> {
        let file: CollateConfigFile = toml::from_str(raw).map_err(|source| CollateError::Toml {
            path: PathBuf::from(origin),
            source,
        })?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CollateConfigFile) -> Self {
        let defaults = Self::default();
        let fields = file
            .fields
            .filter(|fields| !fields.is_empty())
            .unwrap_or(defaults.fields);
        let log_every = match file.log_every {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.log_every,
        };
        Self {
            samples_per_gpu: file.samples_per_gpu.unwrap_or(defaults.samples_per_gpu),
            num_gpus: file.num_gpus.unwrap_or(defaults.num_gpus),
            shuffle: file.shuffle.unwrap_or(defaults.shuffle),
            seed: file.seed.or(defaults.seed),
            drop_last: file.drop_last.unwrap_or(defaults.drop_last),
            log_every,
            fields,
        }
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` (env-var style keys).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup(SAMPLES_PER_GPU_ENV).and_then(|v| v.trim().parse::<usize>().ok()) {
            self.samples_per_gpu = n;
        }
        if let Some(val) = lookup(LOG_EVERY_ENV) {
            if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
                self.log_every = None;
            } else if let Ok(n) = val.trim().parse::<usize>() {
                self.log_every = Some(n);
            }
        }
        self
    }

    pub fn validate(&self) -> CollateResult<()> {
        if self.samples_per_gpu == 0 {
            return Err(CollateError::Config(
                "samples_per_gpu must be at least 1".to_string(),
            ));
        }
        if self.num_gpus == 0 {
            return Err(CollateError::Config(
                "num_gpus must be at least 1".to_string(),
            ));
        }
        self.fields.validate()?;
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.samples_per_gpu * self.num_gpus
    }

    pub fn format_bundle(&self) -> FormatBundle {
        FormatBundle::new(self.fields.clone())
    }
}
