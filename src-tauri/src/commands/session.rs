use identify_core::{AppController, AppError, SessionView};
use std::path::PathBuf;
use tauri::State;

#[tauri::command]
pub fn get_session(controller: State<'_, AppController>) -> Result<SessionView, AppError> {
    Ok(controller.view())
}

#[tauri::command]
pub fn upload_image(
    controller: State<'_, AppController>,
    paths: Vec<String>,
) -> Result<SessionView, AppError> {
    let files: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
    Ok(controller.upload_image(files))
}

#[tauri::command]
pub fn set_image_from_url(
    controller: State<'_, AppController>,
    text: String,
) -> Result<SessionView, AppError> {
    Ok(controller.set_image_from_url(&text))
}

#[tauri::command]
pub fn select_from_history(
    controller: State<'_, AppController>,
    reference: String,
) -> Result<SessionView, AppError> {
    Ok(controller.select_from_history(&reference))
}

#[tauri::command]
pub fn dismiss_error(controller: State<'_, AppController>) -> Result<SessionView, AppError> {
    Ok(controller.dismiss_error())
}
