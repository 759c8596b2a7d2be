use std::io::{Cursor, Read};
use std::path::Path;

use blake3::Hasher;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use vendas_bucket::BucketStore;
use zip::ZipArchive;

use crate::dataset::SourceTable;
use crate::error::{PipelineError, Result};

#[derive(Clone)]
pub struct KaggleCredentials {
    username: String,
    key: String,
}

impl KaggleCredentials {
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            key: key.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// One CSV pulled out of the dataset archive.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub hash: String,
    pub contents: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct LandedFile {
    pub key: String,
    pub hash: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub files: Vec<LandedFile>,
    /// Expected source extracts the archive did not contain.
    pub missing_sources: Vec<String>,
}

pub async fn download_dataset(
    client: &reqwest::Client,
    url: &str,
    credentials: &KaggleCredentials,
) -> Result<Bytes> {
    let response = client
        .get(url)
        .basic_auth(&credentials.username, Some(&credentials.key))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Download(format!(
            "{url} returned status {status}"
        )));
    }

    Ok(response.bytes().await?)
}

/// Every `.csv` entry of the archive, keyed by its base name. Other entries are skipped.
pub fn extract_csv_entries(archive: &[u8]) -> Result<Vec<RawFile>> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut files = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if !entry.is_file() || !entry.name().ends_with(".csv") {
            continue;
        }
        let Some(name) = Path::new(entry.name())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
        else {
            continue;
        };

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        files.push(RawFile {
            name,
            hash: compute_hash(&contents),
            contents: Bytes::from(contents),
        });
    }

    Ok(files)
}

/// Writes the extracted CSVs to the landing bucket under `prefix`.
pub async fn land_files(
    files: Vec<RawFile>,
    destination: &dyn BucketStore,
    prefix: &str,
) -> Result<IngestReport> {
    let missing_sources: Vec<String> = SourceTable::ALL
        .iter()
        .map(|source| source.file_name())
        .filter(|file_name| !files.iter().any(|file| file.name == *file_name))
        .map(str::to_string)
        .collect();
    for file_name in &missing_sources {
        warn!(file = %file_name, "dataset archive is missing an expected extract");
    }

    let mut landed = Vec::with_capacity(files.len());
    for file in files {
        let key = format!("{prefix}{}", file.name);
        let size = file.contents.len();
        destination
            .put_object(&key, file.contents, "text/csv")
            .await
            .map_err(|source| PipelineError::Write {
                key: key.clone(),
                source,
            })?;
        info!(key = %key, size, hash = %file.hash, "landed raw extract");
        landed.push(LandedFile {
            key,
            hash: file.hash,
            size,
        });
    }

    Ok(IngestReport {
        files: landed,
        missing_sources,
    })
}

/// Downloads the dataset archive and lands every CSV it contains.
pub async fn run_ingest(
    client: &reqwest::Client,
    url: &str,
    credentials: &KaggleCredentials,
    destination: &dyn BucketStore,
    prefix: &str,
) -> Result<IngestReport> {
    let archive = download_dataset(client, url, credentials).await?;
    info!(url, size = archive.len(), "downloaded dataset archive");
    let files = extract_csv_entries(&archive)?;
    land_files(files, destination, prefix).await
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    let hash = hasher.finalize();
    hash.to_hex().to_string()
}
