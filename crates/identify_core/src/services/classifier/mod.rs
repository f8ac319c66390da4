pub mod inference;
pub mod model_manager;

use crate::error::AppError;
use crate::models::classify_types::Prediction;
use image::DynamicImage;

/// A loaded model that ranks labels for one image, best first.
pub trait ImageClassifier: Send {
    fn classify(&mut self, image: &DynamicImage) -> Result<Vec<Prediction>, AppError>;
}
