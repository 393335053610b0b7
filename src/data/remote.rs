//! Download of the national daily trend CSV.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use tracing::info;

use crate::domain::DailyRecord;
use crate::error::AppError;
use crate::io::{ColumnMap, parse_records};

/// Italian civil-protection national trend file.
pub const DEFAULT_DATA_URL: &str = "https://raw.githubusercontent.com/pcm-dpc/COVID-19/master/dati-andamento-nazionale/dpc-covid19-ita-andamento-nazionale.csv";

/// Environment variable (or `.env` entry) overriding [`DEFAULT_DATA_URL`].
pub const DATA_URL_ENV: &str = "SIRFIT_DATA_URL";

/// File name used when the raw download is kept on disk.
pub const RAW_FILE_NAME: &str = "dpc-covid19-ita-andamento-nazionale.csv";

pub struct DatasetClient {
    client: Client,
    url: String,
}

impl DatasetClient {
    pub fn new(url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// URL from `SIRFIT_DATA_URL` when set, the default dataset otherwise.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let url = std::env::var(DATA_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_URL.to_string());
        Self::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn fetch_text(&self) -> Result<String, AppError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| AppError::new(2, format!("Dataset request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                2,
                format!("Dataset request failed with status {}.", resp.status()),
            ));
        }

        resp.text()
            .map_err(|e| AppError::new(2, format!("Failed to read dataset response: {e}")))
    }

    /// Download, optionally keep the raw file under `save_dir`, and parse.
    pub fn fetch_records(
        &self,
        columns: &ColumnMap,
        save_dir: Option<&Path>,
    ) -> Result<Vec<DailyRecord>, AppError> {
        let text = self.fetch_text()?;
        info!(url = %self.url, bytes = text.len(), "downloaded dataset");
        if let Some(dir) = save_dir {
            let path = save_raw(dir, &text)?;
            info!(path = %path.display(), "saved raw dataset");
        }
        parse_records(text.as_bytes(), columns)
    }
}

/// Write the raw CSV text into `dir` (created if missing).
pub fn save_raw(dir: &Path, text: &str) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create data directory '{}': {e}", dir.display()),
        )
    })?;
    let path = dir.join(RAW_FILE_NAME);
    fs::write(&path, text)
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_file_lands_in_a_fresh_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");
        let path = save_raw(&dir, "data,totale_casi\n").unwrap();
        assert_eq!(path, dir.join(RAW_FILE_NAME));
        assert_eq!(fs::read_to_string(path).unwrap(), "data,totale_casi\n");
    }

    #[test]
    fn client_keeps_the_given_url() {
        let client = DatasetClient::new("http://localhost/x.csv").unwrap();
        assert_eq!(client.url(), "http://localhost/x.csv");
    }
}
