use identify_core::services::preview::THUMBNAIL_SIZE;
use identify_core::{AppController, AppError};
use tauri::State;

/// `thumbnail` asks for a history-sized preview instead of `max_size`.
#[tauri::command]
pub async fn get_image_preview(
    controller: State<'_, AppController>,
    reference: String,
    max_size: Option<u32>,
    thumbnail: Option<bool>,
) -> Result<String, AppError> {
    let max_size = if thumbnail.unwrap_or(false) {
        Some(THUMBNAIL_SIZE)
    } else {
        max_size
    };
    controller.image_preview(&reference, max_size).await
}
