use crate::error::AppError;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the bytes of an image reference live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Local(PathBuf),
    Remote(String),
}

/// Reads and decodes images for classification and previews.
#[derive(Clone)]
pub struct ImageLoader {
    client: reqwest::Client,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }

    pub async fn load_bytes(&self, source: &ImageSource) -> Result<Vec<u8>, AppError> {
        match source {
            ImageSource::Local(path) => tokio::fs::read(path).await.map_err(|e| AppError {
                message: format!("Failed to read image {}: {}", path.display(), e),
            }),
            ImageSource::Remote(url) => self.fetch(url).await,
        }
    }

    pub async fn load(&self, source: &ImageSource) -> Result<DynamicImage, AppError> {
        let bytes = self.load_bytes(source).await?;
        decode(&bytes)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        tracing::debug!("Fetching image {}", url);
        let response = self.client.get(url).send().await.map_err(|e| AppError {
            message: format!("Failed to fetch {}: {}", url, e),
        })?;

        if !response.status().is_success() {
            return Err(format!("Failed to fetch {}: HTTP {}", url, response.status()).into());
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, AppError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError { message: e.to_string() })?
        .decode()
        .map_err(|e| AppError {
            message: format!("Failed to decode image: {}", e),
        })
}
