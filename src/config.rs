use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::naming::NamingScheme;

pub const DEFAULT_CONFIG_FILE: &str = "ampliconpipeline.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub naming: Option<NamingScheme>,
    #[serde(default)]
    pub qiime: Option<PathBuf>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub denoise: DenoiseEntry,
    #[serde(default)]
    pub diversity: DiversityEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DenoiseEntry {
    #[serde(default)]
    pub trim_left_f: Option<u32>,
    #[serde(default)]
    pub trim_left_r: Option<u32>,
    #[serde(default)]
    pub trunc_len_f: Option<u32>,
    #[serde(default)]
    pub trunc_len_r: Option<u32>,
    #[serde(default)]
    pub chimera_method: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DiversityEntry {
    #[serde(default)]
    pub sampling_depth: Option<u32>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub beta_group_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenoiseParams {
    pub trim_left_f: u32,
    pub trim_left_r: u32,
    pub trunc_len_f: u32,
    pub trunc_len_r: u32,
    pub chimera_method: String,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            trim_left_f: 10,
            trim_left_r: 10,
            trunc_len_f: 0,
            trunc_len_r: 260,
            chimera_method: "consensus".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiversityParams {
    pub sampling_depth: u32,
    pub max_depth: u32,
    pub beta_group_column: String,
}

impl Default for DiversityParams {
    fn default() -> Self {
        Self {
            sampling_depth: 1000,
            max_depth: 4000,
            beta_group_column: "SampleType".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub naming: NamingScheme,
    pub qiime: Option<PathBuf>,
    pub threads: usize,
    pub denoise: DenoiseParams,
    pub diversity: DiversityParams,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            naming: NamingScheme::default(),
            qiime: None,
            threads: default_threads(),
            denoise: DenoiseParams::default(),
            diversity: DiversityParams::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let defaults = ResolvedConfig::default();

        let threads = match config.threads {
            Some(0) => {
                return Err(PipelineError::ConfigParse(
                    "threads must be at least 1".to_string(),
                ));
            }
            Some(threads) => threads,
            None => defaults.threads,
        };

        let denoise = DenoiseParams {
            trim_left_f: config.denoise.trim_left_f.unwrap_or(defaults.denoise.trim_left_f),
            trim_left_r: config.denoise.trim_left_r.unwrap_or(defaults.denoise.trim_left_r),
            trunc_len_f: config.denoise.trunc_len_f.unwrap_or(defaults.denoise.trunc_len_f),
            trunc_len_r: config.denoise.trunc_len_r.unwrap_or(defaults.denoise.trunc_len_r),
            chimera_method: config
                .denoise
                .chimera_method
                .unwrap_or(defaults.denoise.chimera_method),
        };
        if !matches!(denoise.chimera_method.as_str(), "consensus" | "pooled" | "none") {
            return Err(PipelineError::ConfigParse(format!(
                "unknown chimera method: {}",
                denoise.chimera_method
            )));
        }

        let diversity = DiversityParams {
            sampling_depth: config
                .diversity
                .sampling_depth
                .unwrap_or(defaults.diversity.sampling_depth),
            max_depth: config
                .diversity
                .max_depth
                .unwrap_or(defaults.diversity.max_depth),
            beta_group_column: config
                .diversity
                .beta_group_column
                .unwrap_or(defaults.diversity.beta_group_column),
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            naming: config.naming.unwrap_or_default(),
            qiime: config.qiime,
            threads,
            denoise,
            diversity,
        })
    }
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_takes_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.naming, NamingScheme::Olc);
        assert_eq!(resolved.denoise, DenoiseParams::default());
        assert_eq!(resolved.diversity.sampling_depth, 1000);
        assert!(resolved.threads >= 1);
    }
}
