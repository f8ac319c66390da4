use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ModelStatus {
    pub downloaded: bool,
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub confidence: f32,
}

/// Percentage with two decimals, e.g. `0.87654` -> `"87.65"`.
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}", confidence as f64 * 100.0)
}
