use identify_core::{AppController, AppError, ModelStatus, SessionView};
use tauri::State;

#[tauri::command]
pub fn get_model_status(controller: State<'_, AppController>) -> Result<ModelStatus, AppError> {
    Ok(controller.model_status())
}

#[tauri::command]
pub async fn identify(controller: State<'_, AppController>) -> Result<SessionView, AppError> {
    Ok(controller.identify().await)
}
