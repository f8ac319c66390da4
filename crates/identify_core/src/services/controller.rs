use crate::config::Settings;
use crate::error::{AppError, SessionError};
use crate::models::classify_types::{ModelStatus, Prediction};
use crate::models::session_types::SessionView;
use crate::services::classifier::model_manager::{ClassifierSlot, ModelManager};
use crate::services::image_source::{ImageLoader, ImageSource};
use crate::services::preview;
use crate::services::session::Session;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

/// Applies user actions to the session and runs the async work behind them.
/// The session lock is never held across an `.await`.
#[derive(Clone)]
pub struct AppController {
    session: Arc<Mutex<Session>>,
    model_manager: ModelManager,
    loader: ImageLoader,
    in_flight: Arc<Mutex<Option<AbortHandle>>>,
}

impl AppController {
    pub fn new(settings: &Settings, app_data_dir: &Path) -> Self {
        let model_manager = ModelManager::new(app_data_dir, settings.classifier.clone());
        Self::with_model_manager(model_manager, settings.history_limit)
    }

    pub fn with_model_manager(model_manager: ModelManager, history_limit: Option<usize>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(history_limit))),
            model_manager,
            loader: ImageLoader::new(),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn model_manager(&self) -> &ModelManager {
        &self.model_manager
    }

    pub fn view(&self) -> SessionView {
        self.session().view()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model_manager.status()
    }

    /// The single model load of the session. Later calls only return the view.
    pub async fn load_model<F>(&self, on_progress: F) -> SessionView
    where
        F: Fn(u64) + Send + Sync,
    {
        let ticket = self.session().begin_model_load();
        let Some(ticket) = ticket else {
            return self.view();
        };

        tracing::info!("Loading model");
        let outcome = self
            .model_manager
            .load_model(on_progress)
            .await
            .map_err(|e| e.message);

        let mut session = self.session();
        session.finish_model_load(ticket, outcome);
        session.view()
    }

    pub fn upload_image(&self, files: Vec<PathBuf>) -> SessionView {
        self.change_image(|session| {
            session.upload_image(&files);
        })
    }

    pub fn set_image_from_url(&self, text: &str) -> SessionView {
        self.change_image(|session| session.set_image_from_url(text))
    }

    /// Unknown references leave the image alone; the error shows up in the view.
    pub fn select_from_history(&self, reference: &str) -> SessionView {
        self.change_image(|session| {
            let _ = session.select_from_history(reference);
        })
    }

    pub fn dismiss_error(&self) -> SessionView {
        let mut session = self.session();
        session.dismiss_error();
        session.view()
    }

    /// Classifies the current image. Returns once the result is applied, the
    /// request fails, or a newer action supersedes it.
    pub async fn identify(&self) -> SessionView {
        let (ticket, source) = {
            let mut session = self.session();
            let ticket = match session.begin_identify() {
                Ok(ticket) => ticket,
                Err(_) => return session.view(),
            };
            let source = session.resolve(&ticket.reference);
            (ticket, source)
        };

        let Some(source) = source else {
            let mut session = self.session();
            session.finish_identify(
                &ticket,
                Err(SessionError::ImageLoad(format!(
                    "{} is no longer available",
                    ticket.reference
                ))),
            );
            return session.view();
        };

        let loader = self.loader.clone();
        let slot = self.model_manager.classifier_slot();
        let handle = tokio::spawn(async move { classify_source(loader, slot, source).await });

        if let Some(previous) = self.in_flight_lock().replace(handle.abort_handle()) {
            previous.abort();
        }

        let outcome = handle.await;

        let mut session = self.session();
        match outcome {
            Ok(outcome) => {
                session.finish_identify(&ticket, outcome);
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!("Classification of {} was cancelled", ticket.reference);
                session.cancel_identify(&ticket);
            }
            Err(e) => {
                session.finish_identify(
                    &ticket,
                    Err(SessionError::Classification(format!(
                        "Classification task failed: {}",
                        e
                    ))),
                );
            }
        }
        session.view()
    }

    /// A data URI for local references; URLs are returned as they are.
    pub async fn image_preview(
        &self,
        reference: &str,
        max_size: Option<u32>,
    ) -> Result<String, AppError> {
        let source = self
            .session()
            .resolve(reference)
            .ok_or_else(|| AppError::from(format!("Unknown image reference {}", reference)))?;

        match source {
            ImageSource::Remote(url) => Ok(url),
            ImageSource::Local(path) => {
                let img = self.loader.load(&ImageSource::Local(path)).await?;
                tokio::task::spawn_blocking(move || preview::preview_data_uri(&img, max_size))
                    .await
                    .map_err(|e| AppError {
                        message: format!("Preview task failed: {}", e),
                    })?
            }
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_lock(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies an image transition, then aborts the running classification if
    /// the transition superseded it. The abort happens after the lock is
    /// released so the cancelled `identify` sees the new state.
    fn change_image<F>(&self, transition: F) -> SessionView
    where
        F: FnOnce(&mut Session),
    {
        let (view, superseded) = {
            let mut session = self.session();
            transition(&mut session);
            (session.view(), !session.is_identifying())
        };
        if superseded {
            self.abort_in_flight();
        }
        view
    }

    fn abort_in_flight(&self) {
        if let Some(handle) = self.in_flight_lock().take() {
            handle.abort();
        }
    }
}

async fn classify_source(
    loader: ImageLoader,
    slot: ClassifierSlot,
    source: ImageSource,
) -> Result<Vec<Prediction>, SessionError> {
    let image = loader
        .load(&source)
        .await
        .map_err(|e| SessionError::ImageLoad(e.message))?;

    tokio::task::spawn_blocking(move || {
        let mut guard = slot
            .lock()
            .map_err(|_| SessionError::Classification("Classifier lock poisoned".to_string()))?;
        match guard.as_mut() {
            Some(classifier) => classifier
                .classify(&image)
                .map_err(|e| SessionError::Classification(e.message)),
            None => Err(SessionError::ModelNotReady),
        }
    })
    .await
    .map_err(|e| SessionError::Classification(format!("Inference task failed: {}", e)))?
}
