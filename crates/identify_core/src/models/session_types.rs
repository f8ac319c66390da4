use serde::Serialize;

/// Everything the view needs to render one frame.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SessionView {
    pub model_loading: bool,
    pub model_ready: bool,
    pub current_image: Option<String>,
    pub url_input: String,
    pub identifying: bool,
    pub results: Vec<ResultView>,
    pub history: Vec<String>,
    pub error: Option<ErrorView>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResultView {
    pub label: String,
    pub confidence: f32,
    pub percentage: String,
    pub best_guess: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ErrorView {
    pub kind: String,
    pub message: String,
}
