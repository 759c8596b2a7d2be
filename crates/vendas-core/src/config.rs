//! Runtime configuration: an optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vendas_bucket::S3Config;

use crate::error::{PipelineError, Result};
use crate::ingestion::KaggleCredentials;

pub const DEFAULT_DATASET_URL: &str =
    "https://www.kaggle.com/api/v1/datasets/download/olistbr/brazilian-ecommerce";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    S3,
    Local,
}

/// Where a stage reads from and writes to, relative to its buckets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageLayout {
    pub source_prefix: String,
    pub destination_prefix: String,
}

impl StageLayout {
    pub fn source_key(&self, file_name: &str) -> String {
        format!("{}{}", self.source_prefix, file_name)
    }

    pub fn destination_key(&self, file_name: &str) -> String {
        format!("{}{}", self.destination_prefix, file_name)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageKind,
    /// Root directory for `storage = "local"`; each bucket becomes a subdirectory.
    pub local_root: PathBuf,
    pub landing_bucket: String,
    pub staging_bucket: String,
    pub refined_bucket: String,
    pub landing_prefix: String,
    pub staging_prefix: String,
    pub refined_prefix: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
    pub dataset_url: String,
    pub kaggle_username: Option<String>,
    #[serde(skip_serializing)]
    pub kaggle_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::S3,
            local_root: PathBuf::from("data"),
            landing_bucket: "landzone-vendas".to_string(),
            staging_bucket: "stg-vendas".to_string(),
            refined_bucket: "ref-vendas".to_string(),
            landing_prefix: String::new(),
            staging_prefix: String::new(),
            refined_prefix: String::new(),
            region: "sa-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            kaggle_username: None,
            kaggle_key: None,
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("storage", &self.storage)
            .field("local_root", &self.local_root)
            .field("landing_bucket", &self.landing_bucket)
            .field("staging_bucket", &self.staging_bucket)
            .field("refined_bucket", &self.refined_bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("dataset_url", &self.dataset_url)
            .finish_non_exhaustive()
    }
}

impl PipelineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| PipelineError::Config(err.to_string()))
    }

    /// Reads the optional TOML file, then applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|err| {
                    PipelineError::Config(format!("failed to read {}: {err}", path.display()))
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(storage) = lookup("VENDAS_STORAGE") {
            self.storage = match storage.to_ascii_lowercase().as_str() {
                "s3" => StorageKind::S3,
                "local" => StorageKind::Local,
                other => {
                    return Err(PipelineError::Config(format!(
                        "VENDAS_STORAGE must be 's3' or 'local', got '{other}'"
                    )))
                }
            };
        }
        if let Some(root) = lookup("VENDAS_LOCAL_ROOT") {
            self.local_root = PathBuf::from(root);
        }

        let strings: [(&str, &mut String); 4] = [
            ("VENDAS_LANDING_BUCKET", &mut self.landing_bucket),
            ("VENDAS_STAGING_BUCKET", &mut self.staging_bucket),
            ("VENDAS_REFINED_BUCKET", &mut self.refined_bucket),
            ("VENDAS_DATASET_URL", &mut self.dataset_url),
        ];
        for (key, slot) in strings {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }
        if let Some(region) = lookup("S3_REGION") {
            self.region = region;
        }

        let optionals: [(&str, &mut Option<String>); 5] = [
            ("S3_ENDPOINT_URL", &mut self.endpoint),
            ("S3_ACCESS_KEY_ID", &mut self.access_key_id),
            ("S3_SECRET_ACCESS_KEY", &mut self.secret_access_key),
            ("KAGGLE_USERNAME", &mut self.kaggle_username),
            ("KAGGLE_KEY", &mut self.kaggle_key),
        ];
        for (key, slot) in optionals {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        }

        if let Some(flag) = lookup("S3_FORCE_PATH_STYLE") {
            self.force_path_style =
                matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    pub fn s3_config(&self, bucket: &str) -> S3Config {
        S3Config {
            bucket: bucket.to_string(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            force_path_style: self.force_path_style,
        }
    }

    pub fn local_bucket_root(&self, bucket: &str) -> PathBuf {
        self.local_root.join(bucket)
    }

    pub fn staging_layout(&self) -> StageLayout {
        StageLayout {
            source_prefix: self.landing_prefix.clone(),
            destination_prefix: self.staging_prefix.clone(),
        }
    }

    pub fn refine_layout(&self) -> StageLayout {
        StageLayout {
            source_prefix: self.staging_prefix.clone(),
            destination_prefix: self.refined_prefix.clone(),
        }
    }

    pub fn kaggle_credentials(&self) -> Result<KaggleCredentials> {
        match (&self.kaggle_username, &self.kaggle_key) {
            (Some(username), Some(key)) => Ok(KaggleCredentials::new(username, key)),
            _ => Err(PipelineError::Config(
                "KAGGLE_USERNAME and KAGGLE_KEY must be set to download the dataset".into(),
            )),
        }
    }
}
