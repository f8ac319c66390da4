use crate::config::ClassifierSettings;
use crate::error::AppError;
use crate::models::classify_types::ModelStatus;
use crate::services::classifier::inference::OnnxClassifier;
use crate::services::classifier::ImageClassifier;
use futures::StreamExt;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type ClassifierSlot = Arc<Mutex<Option<Box<dyn ImageClassifier>>>>;

/// Owns the downloaded model files and the loaded classifier.
#[derive(Clone)]
pub struct ModelManager {
    pub model_dir: PathBuf,
    settings: ClassifierSettings,
    classifier: ClassifierSlot,
    loading: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
}

impl ModelManager {
    pub fn new(app_data_dir: &Path, settings: ClassifierSettings) -> Self {
        Self {
            model_dir: app_data_dir.join("models"),
            settings,
            classifier: Arc::new(Mutex::new(None)),
            loading: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.settings.model_file)
    }

    pub fn config_path(&self) -> PathBuf {
        self.model_dir.join(&self.settings.config_file)
    }

    pub fn is_downloaded(&self) -> bool {
        self.model_path().exists() && self.config_path().exists()
    }

    pub fn is_ready(&self) -> bool {
        self.classifier
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    pub fn get_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            downloaded: self.is_downloaded(),
            loading: self.is_loading(),
            ready: self.is_ready(),
            error: self.get_error(),
        }
    }

    pub fn classifier_slot(&self) -> ClassifierSlot {
        self.classifier.clone()
    }

    /// Puts an already constructed classifier in place of the ONNX one.
    pub fn install(&self, classifier: Box<dyn ImageClassifier>) -> Result<(), AppError> {
        let mut slot = self.classifier.lock().map_err(|_| AppError {
            message: "Classifier lock poisoned".to_string(),
        })?;
        *slot = Some(classifier);
        Ok(())
    }

    pub async fn download_model<F>(&self, on_progress: F) -> Result<(), AppError>
    where
        F: Fn(u64) + Send + Sync,
    {
        if self.is_downloaded() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.model_dir)
            .await
            .map_err(|e| AppError {
                message: format!("Failed to create model directory: {}", e),
            })?;

        let config_path = self.config_path();
        if !config_path.exists() {
            download_file(&self.settings.config_url, &config_path, &|_| {}).await?;
        }

        let model_path = self.model_path();
        if !model_path.exists() {
            download_file(&self.settings.model_url, &model_path, &on_progress).await?;
        }

        Ok(())
    }

    /// Downloads the model if needed and loads it. Loading twice is an error.
    pub async fn load_model<F>(&self, on_progress: F) -> Result<(), AppError>
    where
        F: Fn(u64) + Send + Sync,
    {
        if self.is_ready() {
            return Ok(());
        }
        if self.loading.swap(true, Ordering::SeqCst) {
            return Err("Model is already loading".into());
        }
        if let Ok(mut error) = self.error.lock() {
            *error = None;
        }

        let result = self.do_load_model(on_progress).await;

        self.loading.store(false, Ordering::SeqCst);
        if let Err(ref e) = result {
            if let Ok(mut error) = self.error.lock() {
                *error = Some(e.message.clone());
            }
        }

        result
    }

    async fn do_load_model<F>(&self, on_progress: F) -> Result<(), AppError>
    where
        F: Fn(u64) + Send + Sync,
    {
        self.download_model(on_progress).await?;

        let config_path = self.config_path();
        let config_content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| AppError {
                message: format!("Failed to read config file {}: {}", config_path.display(), e),
            })?;
        let labels = parse_labels(&config_content)?;
        tracing::info!("Loaded {} labels from {}", labels.len(), config_path.display());

        let model_path = self.model_path();
        let settings = self.settings.clone();
        let classifier = tokio::task::spawn_blocking(move || -> Result<OnnxClassifier, AppError> {
            let session = build_session(&model_path, settings.use_gpu)?;
            Ok(OnnxClassifier::new(session, labels, &settings))
        })
        .await
        .map_err(|e| AppError {
            message: format!("Failed to spawn model loading task: {}", e),
        })??;

        self.install(Box::new(classifier))?;
        tracing::info!("Model loaded from {}", self.model_path().display());
        Ok(())
    }
}

fn build_session(model_path: &Path, use_gpu: bool) -> Result<Session, AppError> {
    let _ = ort::init().with_name("image-identify").commit();

    let mut builder = Session::builder()
        .map_err(|e| AppError {
            message: format!("Failed to create session builder: {}", e),
        })?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(|e| AppError {
            message: format!("Failed to set optimization level: {}", e),
        })?
        .with_intra_threads(4)
        .map_err(|e| AppError {
            message: format!("Failed to set intra threads: {}", e),
        })?;

    if use_gpu {
        builder = builder
            .with_execution_providers([
                ort::execution_providers::DirectMLExecutionProvider::default().build(),
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CUDAExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| AppError {
                message: format!("Failed to register GPU execution providers: {}", e),
            })?;
    } else {
        builder = builder
            .with_execution_providers([
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| AppError {
                message: format!("Failed to register CPU execution provider: {}", e),
            })?;
    }

    builder.commit_from_file(model_path).map_err(|e| AppError {
        message: format!("Failed to load ONNX model: {}", e),
    })
}

/// Labels ordered by class index, from the `id2label` map of a model config.
pub fn parse_labels(config_content: &str) -> Result<Vec<String>, AppError> {
    let config: serde_json::Value = serde_json::from_str(config_content).map_err(|e| AppError {
        message: format!("Failed to parse config JSON: {}", e),
    })?;

    let id2label = config["id2label"].as_object().ok_or_else(|| AppError {
        message: "Config missing id2label field".to_string(),
    })?;

    let mut labels: Vec<(usize, String)> = id2label
        .iter()
        .filter_map(|(k, v)| {
            let idx = k.parse::<usize>().ok()?;
            let label = v.as_str().unwrap_or("unknown").to_string();
            Some((idx, label))
        })
        .collect();
    labels.sort_by_key(|(idx, _)| *idx);

    Ok(labels.into_iter().map(|(_, label)| label).collect())
}

async fn download_file(
    url: &str,
    dest: &Path,
    on_progress: &(dyn Fn(u64) + Send + Sync),
) -> Result<(), AppError> {
    tracing::info!("Downloading {} to {}", url, dest.display());
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(format!("Failed to download {}: HTTP {}", url, response.status()).into());
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    // Write to a sibling file first so an interrupted download never looks complete.
    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await.map_err(|e| AppError {
        message: format!("Failed to create file {}: {}", partial.display(), e),
    })?;

    let mut stream = response.bytes_stream();
    let mut last_emit = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.into());
            }
        };
        downloaded += chunk.len() as u64;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk)
            .await
            .map_err(|e| AppError {
                message: format!("Failed to write to file: {}", e),
            })?;

        if total_size > 0 {
            let progress = (downloaded * 100) / total_size;
            if progress > last_emit {
                on_progress(progress);
                last_emit = progress;
            }
        }
    }
    tokio::io::AsyncWriteExt::flush(&mut file)
        .await
        .map_err(|e| AppError {
            message: format!("Failed to flush {}: {}", partial.display(), e),
        })?;
    drop(file);

    tokio::fs::rename(&partial, dest).await.map_err(|e| AppError {
        message: format!("Failed to move {} into place: {}", dest.display(), e),
    })?;
    on_progress(100);

    Ok(())
}
