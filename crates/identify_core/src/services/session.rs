use crate::error::SessionError;
use crate::models::classify_types::{format_confidence, Prediction};
use crate::models::session_types::{ErrorView, ResultView, SessionView};
use crate::services::image_source::ImageSource;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

/// Prefix of the transient references minted for uploaded files.
pub const LOCAL_REFERENCE_PREFIX: &str = "blob:image-identify/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Absent,
    Loading { generation: u64 },
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyTicket {
    generation: u64,
    pub reference: String,
}

impl IdentifyTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Application state for one run. Every mutation goes through a transition
/// method; async work is split into a `begin_*` that hands out a ticket and a
/// `finish_*` that only applies if the ticket is still the latest one.
#[derive(Debug)]
pub struct Session {
    model: ModelState,
    model_generation: u64,
    current_image: Option<String>,
    url_input: String,
    results: Vec<Prediction>,
    history: VecDeque<String>,
    history_limit: Option<usize>,
    local_files: HashMap<String, PathBuf>,
    next_local_id: u64,
    identify_generation: u64,
    pending_identify: Option<u64>,
    error: Option<SessionError>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Session {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            model: ModelState::Absent,
            model_generation: 0,
            current_image: None,
            url_input: String::new(),
            results: Vec::new(),
            history: VecDeque::new(),
            history_limit,
            local_files: HashMap::new(),
            next_local_id: 0,
            identify_generation: 0,
            pending_identify: None,
            error: None,
        }
    }

    pub fn model_state(&self) -> ModelState {
        self.model
    }

    pub fn is_model_ready(&self) -> bool {
        self.model == ModelState::Ready
    }

    pub fn is_model_loading(&self) -> bool {
        matches!(self.model, ModelState::Loading { .. })
    }

    pub fn current_image(&self) -> Option<&str> {
        self.current_image.as_deref()
    }

    pub fn url_input(&self) -> &str {
        &self.url_input
    }

    pub fn results(&self) -> &[Prediction] {
        &self.results
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn is_identifying(&self) -> bool {
        self.pending_identify.is_some()
    }

    /// Starts the one model load of the session. Refused while a load is
    /// pending or a model is already present.
    pub fn begin_model_load(&mut self) -> Option<LoadTicket> {
        match self.model {
            ModelState::Loading { .. } | ModelState::Ready => {
                tracing::debug!("Model load already started; ignoring");
                None
            }
            ModelState::Absent => {
                self.model_generation += 1;
                self.model = ModelState::Loading {
                    generation: self.model_generation,
                };
                Some(LoadTicket {
                    generation: self.model_generation,
                })
            }
        }
    }

    /// Returns false when the ticket is stale and the outcome was dropped.
    pub fn finish_model_load(&mut self, ticket: LoadTicket, outcome: Result<(), String>) -> bool {
        if self.model != (ModelState::Loading { generation: ticket.generation }) {
            tracing::debug!("Discarding stale model load #{}", ticket.generation);
            return false;
        }

        match outcome {
            Ok(()) => {
                tracing::info!("Model ready");
                self.model = ModelState::Ready;
            }
            Err(message) => {
                tracing::error!("Error loading model: {}", message);
                self.model = ModelState::Absent;
                self.error = Some(SessionError::ModelLoad(message));
            }
        }
        true
    }

    /// Takes the first selected file as the new current image. An empty
    /// selection clears the current image.
    pub fn upload_image(&mut self, files: &[PathBuf]) -> Option<String> {
        let reference = files.first().map(|path| {
            self.next_local_id += 1;
            let reference = format!("{}{}", LOCAL_REFERENCE_PREFIX, self.next_local_id);
            self.local_files.insert(reference.clone(), path.clone());
            reference
        });
        self.assign_new_image(reference.clone());
        reference
    }

    /// Uses `text` verbatim as the current image. Empty text means no image.
    /// Text that looks like an upload reference is refused and leaves the
    /// current image alone.
    pub fn set_image_from_url(&mut self, text: &str) {
        self.url_input = text.to_string();
        if text.starts_with(LOCAL_REFERENCE_PREFIX) {
            self.error = Some(SessionError::ImageLoad(format!("{} is not a URL", text)));
            return;
        }
        let reference = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        self.assign_new_image(reference);
    }

    /// Re-shows a recorded image. History is left untouched.
    pub fn select_from_history(&mut self, reference: &str) -> Result<(), SessionError> {
        if !self.history.iter().any(|entry| entry == reference) {
            let err = SessionError::UnknownHistoryEntry(reference.to_string());
            self.error = Some(err.clone());
            return Err(err);
        }

        if self.current_image.as_deref() == Some(reference) {
            return Ok(());
        }

        self.invalidate_identify();
        self.results.clear();
        self.error = None;
        self.current_image = Some(reference.to_string());
        Ok(())
    }

    /// Validates preconditions and marks a classification as in flight.
    pub fn begin_identify(&mut self) -> Result<IdentifyTicket, SessionError> {
        if !self.is_model_ready() {
            tracing::error!("Model is not loaded; cannot identify");
            self.error = Some(SessionError::ModelNotReady);
            return Err(SessionError::ModelNotReady);
        }

        let Some(reference) = self.current_image.clone() else {
            self.error = Some(SessionError::NoImage);
            return Err(SessionError::NoImage);
        };

        self.url_input.clear();
        self.identify_generation += 1;
        self.pending_identify = Some(self.identify_generation);

        Ok(IdentifyTicket {
            generation: self.identify_generation,
            reference,
        })
    }

    /// Applies a classification outcome. Failures keep the previous results.
    /// Returns false when the ticket was superseded.
    pub fn finish_identify(
        &mut self,
        ticket: &IdentifyTicket,
        outcome: Result<Vec<Prediction>, SessionError>,
    ) -> bool {
        if self.pending_identify != Some(ticket.generation) {
            tracing::debug!(
                "Discarding stale classification #{} for {}",
                ticket.generation,
                ticket.reference
            );
            return false;
        }
        self.pending_identify = None;

        match outcome {
            Ok(predictions) => {
                tracing::info!("Classification results: {:?}", predictions);
                self.results = predictions;
                self.error = None;
            }
            Err(err) => {
                tracing::error!("Error occurred during identification: {}", err);
                self.error = Some(err);
            }
        }
        true
    }

    /// Drops the in-flight marker for a task that was cancelled before it
    /// reported back. Returns false when a newer request owns the marker.
    pub fn cancel_identify(&mut self, ticket: &IdentifyTicket) -> bool {
        if self.pending_identify != Some(ticket.generation) {
            return false;
        }
        self.pending_identify = None;
        true
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Where the bytes behind `reference` come from. `None` for a local
    /// reference that is no longer registered.
    pub fn resolve(&self, reference: &str) -> Option<ImageSource> {
        if let Some(path) = self.local_files.get(reference) {
            return Some(ImageSource::Local(path.clone()));
        }
        if reference.starts_with(LOCAL_REFERENCE_PREFIX) {
            return None;
        }
        Some(ImageSource::Remote(reference.to_string()))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            model_loading: self.is_model_loading(),
            model_ready: self.is_model_ready(),
            current_image: self.current_image.clone(),
            url_input: self.url_input.clone(),
            identifying: self.is_identifying(),
            results: self
                .results
                .iter()
                .enumerate()
                .map(|(index, prediction)| ResultView {
                    label: prediction.class_name.clone(),
                    confidence: prediction.confidence,
                    percentage: format_confidence(prediction.confidence),
                    best_guess: index == 0,
                })
                .collect(),
            history: self.history.iter().cloned().collect(),
            error: self.error.as_ref().map(|err| ErrorView {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn assign_new_image(&mut self, reference: Option<String>) {
        self.invalidate_identify();
        self.results.clear();
        self.error = None;
        self.current_image = reference.clone();

        if let Some(reference) = reference {
            tracing::info!("Adding image to history: {}", reference);
            self.history.push_front(reference);
            self.enforce_history_limit();
        }
    }

    fn enforce_history_limit(&mut self) {
        let Some(limit) = self.history_limit else {
            return;
        };
        if self.history.len() <= limit {
            return;
        }

        self.history.truncate(limit);
        let history = &self.history;
        let current = self.current_image.as_deref();
        self.local_files.retain(|reference, _| {
            current == Some(reference.as_str()) || history.iter().any(|entry| entry == reference)
        });
    }

    fn invalidate_identify(&mut self) {
        self.identify_generation += 1;
        self.pending_identify = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_session() -> Session {
        let mut session = Session::default();
        let ticket = session.begin_model_load().unwrap();
        assert!(session.finish_model_load(ticket, Ok(())));
        session
    }

    fn prediction(name: &str, confidence: f32) -> Prediction {
        Prediction {
            class_name: name.to_string(),
            confidence,
        }
    }

    #[test]
    fn model_load_success_and_failure() {
        let mut session = Session::default();
        let ticket = session.begin_model_load().unwrap();
        assert!(session.is_model_loading());
        assert!(session.view().model_loading);

        assert!(session.finish_model_load(ticket, Err("offline".to_string())));
        assert!(!session.is_model_loading());
        assert!(!session.is_model_ready());
        assert_eq!(
            session.error(),
            Some(&SessionError::ModelLoad("offline".to_string()))
        );

        let session = ready_session();
        assert_eq!(session.model_state(), ModelState::Ready);
    }

    #[test]
    fn second_model_load_is_refused() {
        let mut session = Session::default();
        let ticket = session.begin_model_load().unwrap();
        assert!(session.begin_model_load().is_none());
        session.finish_model_load(ticket, Ok(()));
        assert!(session.begin_model_load().is_none());
    }

    #[test]
    fn history_is_reverse_chronological() {
        let mut session = Session::default();
        let a = session.upload_image(&[PathBuf::from("/tmp/a.png")]).unwrap();
        session.set_image_from_url("http://x/y.jpg");
        let b = session
            .upload_image(&[PathBuf::from("/tmp/b.png"), PathBuf::from("/tmp/c.png")])
            .unwrap();

        let history: Vec<&str> = session.history().collect();
        assert_eq!(history, vec![b.as_str(), "http://x/y.jpg", a.as_str()]);
        assert_eq!(session.current_image(), Some(b.as_str()));
    }

    #[test]
    fn empty_selections_clear_image_without_history() {
        let mut session = Session::default();
        session.set_image_from_url("http://x/y.jpg");

        assert_eq!(session.upload_image(&[]), None);
        assert_eq!(session.current_image(), None);

        session.set_image_from_url("");
        assert_eq!(session.current_image(), None);
        assert_eq!(session.history_len(), 1);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut session = Session::default();
        session.set_image_from_url("http://x/y.jpg");
        session.set_image_from_url("http://x/y.jpg");
        assert_eq!(session.history_len(), 2);
    }

    #[test]
    fn each_upload_mints_a_new_reference() {
        let mut session = Session::default();
        let path = PathBuf::from("/tmp/a.png");
        let first = session.upload_image(&[path.clone()]).unwrap();
        let second = session.upload_image(&[path.clone()]).unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with(LOCAL_REFERENCE_PREFIX));
        assert_eq!(session.resolve(&first), Some(ImageSource::Local(path)));
    }

    #[test]
    fn url_is_used_verbatim() {
        let mut session = Session::default();
        session.set_image_from_url("  not a url ");
        assert_eq!(session.current_image(), Some("  not a url "));
        assert_eq!(session.url_input(), "  not a url ");
        assert_eq!(
            session.resolve("  not a url "),
            Some(ImageSource::Remote("  not a url ".to_string()))
        );
    }

    #[test]
    fn new_image_clears_results() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");
        let ticket = session.begin_identify().unwrap();
        session.finish_identify(&ticket, Ok(vec![prediction("tabby", 0.9)]));
        assert_eq!(session.results().len(), 1);

        session.upload_image(&[PathBuf::from("/tmp/a.png")]);
        assert!(session.results().is_empty());
    }

    #[test]
    fn reselecting_keeps_history() {
        let mut session = Session::default();
        let a = session.upload_image(&[PathBuf::from("/tmp/a.png")]).unwrap();
        session.set_image_from_url("http://x/y.jpg");
        let before: Vec<String> = session.history().map(str::to_string).collect();

        session.select_from_history(&a).unwrap();
        session.select_from_history("http://x/y.jpg").unwrap();
        session.select_from_history(&a).unwrap();

        let after: Vec<String> = session.history().map(str::to_string).collect();
        assert_eq!(before, after);
        assert_eq!(session.current_image(), Some(a.as_str()));
    }

    #[test]
    fn reselecting_another_image_clears_results() {
        let mut session = ready_session();
        let a = session.upload_image(&[PathBuf::from("/tmp/a.png")]).unwrap();
        session.set_image_from_url("http://x/y.jpg");
        let ticket = session.begin_identify().unwrap();
        session.finish_identify(&ticket, Ok(vec![prediction("tabby", 0.9)]));

        session.select_from_history("http://x/y.jpg").unwrap();
        assert_eq!(session.results().len(), 1);

        session.select_from_history(&a).unwrap();
        assert!(session.results().is_empty());
    }

    #[test]
    fn unknown_history_entry_is_rejected() {
        let mut session = Session::default();
        session.set_image_from_url("http://x/y.jpg");

        let err = session.select_from_history("http://other").unwrap_err();
        assert_eq!(
            err,
            SessionError::UnknownHistoryEntry("http://other".to_string())
        );
        assert_eq!(session.current_image(), Some("http://x/y.jpg"));
    }

    #[test]
    fn identify_without_model_changes_nothing_but_error() {
        let mut session = Session::default();
        session.set_image_from_url("http://x/y.jpg");
        let before = session.view();

        assert_eq!(session.begin_identify(), Err(SessionError::ModelNotReady));

        let after = session.view();
        assert_eq!(after.error.as_ref().unwrap().kind, "model_not_ready");
        assert_eq!(
            SessionView {
                error: None,
                ..after
            },
            before
        );
    }

    #[test]
    fn identify_without_image_is_refused() {
        let mut session = ready_session();
        assert_eq!(session.begin_identify(), Err(SessionError::NoImage));
        assert!(!session.is_identifying());
    }

    #[test]
    fn identify_clears_url_field_and_applies_results() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");

        let ticket = session.begin_identify().unwrap();
        assert_eq!(ticket.reference, "http://x/y.jpg");
        assert_eq!(session.url_input(), "");
        assert!(session.view().identifying);

        assert!(session.finish_identify(
            &ticket,
            Ok(vec![prediction("tabby", 0.8), prediction("tiger cat", 0.15)])
        ));
        assert!(!session.is_identifying());
        assert_eq!(session.results()[0].class_name, "tabby");
    }

    #[test]
    fn failed_identify_keeps_previous_results() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");
        let ticket = session.begin_identify().unwrap();
        session.finish_identify(&ticket, Ok(vec![prediction("tabby", 0.8)]));

        let ticket = session.begin_identify().unwrap();
        session.finish_identify(
            &ticket,
            Err(SessionError::Classification("boom".to_string())),
        );

        assert_eq!(session.results(), &[prediction("tabby", 0.8)]);
        assert_eq!(session.view().error.unwrap().kind, "classification");
    }

    #[test]
    fn stale_identify_is_discarded_after_image_change() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");
        let ticket = session.begin_identify().unwrap();

        session.set_image_from_url("http://x/z.jpg");
        assert!(!session.finish_identify(&ticket, Ok(vec![prediction("tabby", 0.8)])));
        assert!(session.results().is_empty());
        assert!(!session.is_identifying());
    }

    #[test]
    fn cancelled_identify_clears_only_its_own_marker() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");
        let first = session.begin_identify().unwrap();
        let second = session.begin_identify().unwrap();

        assert!(!session.cancel_identify(&first));
        assert!(session.is_identifying());
        assert!(session.cancel_identify(&second));
        assert!(!session.is_identifying());
        assert!(!session.finish_identify(&second, Ok(vec![prediction("late", 0.5)])));
    }

    #[test]
    fn upload_reference_typed_as_url_is_refused() {
        let mut session = ready_session();
        let path = PathBuf::from("/tmp/cat.png");
        let uploaded = session.upload_image(&[path.clone()]).unwrap();

        session.set_image_from_url(&uploaded);
        assert_eq!(session.current_image(), Some(uploaded.as_str()));
        assert_eq!(session.url_input(), uploaded);
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.view().error.unwrap().kind, "image_load");

        session.set_image_from_url("blob:image-identify/77");
        assert_eq!(session.current_image(), Some(uploaded.as_str()));
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.resolve(&uploaded), Some(ImageSource::Local(path)));
    }

    #[test]
    fn only_latest_identify_applies() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");
        let first = session.begin_identify().unwrap();
        let second = session.begin_identify().unwrap();
        assert!(second.generation() > first.generation());

        assert!(!session.finish_identify(&first, Ok(vec![prediction("old", 0.5)])));
        assert!(session.finish_identify(&second, Ok(vec![prediction("new", 0.5)])));
        assert_eq!(session.results()[0].class_name, "new");
    }

    #[test]
    fn view_formats_results() {
        let mut session = ready_session();
        session.set_image_from_url("http://x/y.jpg");
        let ticket = session.begin_identify().unwrap();
        session.finish_identify(
            &ticket,
            Ok(vec![prediction("tabby", 0.87654), prediction("tiger cat", 0.1)]),
        );

        let view = session.view();
        assert_eq!(view.results[0].percentage, "87.65");
        assert!(view.results[0].best_guess);
        assert_eq!(view.results[1].percentage, "10.00");
        assert!(!view.results[1].best_guess);
    }

    #[test]
    fn history_limit_evicts_oldest() {
        let mut session = Session::new(Some(2));
        let a = session.upload_image(&[PathBuf::from("/tmp/a.png")]).unwrap();
        session.set_image_from_url("http://x/1.jpg");
        session.set_image_from_url("http://x/2.jpg");

        let history: Vec<&str> = session.history().collect();
        assert_eq!(history, vec!["http://x/2.jpg", "http://x/1.jpg"]);
        assert_eq!(session.resolve(&a), None);
    }

    #[test]
    fn scenario_upload_paste_identify_reselect() {
        let mut session = ready_session();
        let a = session.upload_image(&[PathBuf::from("/tmp/a.png")]).unwrap();
        assert_eq!(session.history().collect::<Vec<_>>(), vec![a.as_str()]);

        session.set_image_from_url("http://x/y.jpg");
        assert!(session.results().is_empty());
        assert_eq!(
            session.history().collect::<Vec<_>>(),
            vec!["http://x/y.jpg", a.as_str()]
        );

        let ticket = session.begin_identify().unwrap();
        session.finish_identify(&ticket, Ok(vec![prediction("tabby", 0.7)]));
        assert_eq!(session.results().len(), 1);

        session.select_from_history(&a).unwrap();
        assert_eq!(session.current_image(), Some(a.as_str()));
        assert_eq!(session.history_len(), 2);
    }

    #[test]
    fn dismiss_error_clears_it() {
        let mut session = Session::default();
        let _ = session.begin_identify();
        assert!(session.error().is_some());
        session.dismiss_error();
        assert!(session.error().is_none());
    }
}
