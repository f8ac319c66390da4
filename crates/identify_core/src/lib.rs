//! Core of Image Identify: the session state machine, image sources, the
//! classifier seam and the ONNX model lifecycle. Free of any UI toolkit.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use config::Settings;
pub use error::{AppError, SessionError};
pub use models::classify_types::{ModelStatus, Prediction};
pub use models::session_types::SessionView;
pub use services::controller::AppController;
