mod commands;

use identify_core::{logging, AppController, Settings};
use tauri::{Emitter, Manager};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_window_state::Builder::default().build())
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir()?;
            std::fs::create_dir_all(&app_data_dir)?;

            let settings = Settings::load_or_default(&app_data_dir);
            if let Err(e) = logging::init(&settings.log_filter) {
                eprintln!("Failed to initialize logging: {}", e);
            }

            let controller = AppController::new(&settings, &app_data_dir);
            app.manage(controller.clone());

            // The model loads once per run; the view shows only a loading
            // indicator until `session-changed` reports it done.
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let progress_handle = app_handle.clone();
                let view = controller
                    .load_model(move |progress| {
                        let _ = progress_handle.emit("download-progress", progress);
                    })
                    .await;
                if let Err(e) = app_handle.emit("session-changed", &view) {
                    tracing::warn!("Failed to emit session-changed: {}", e);
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::session::get_session,
            commands::session::upload_image,
            commands::session::set_image_from_url,
            commands::session::select_from_history,
            commands::session::dismiss_error,
            commands::classifier::get_model_status,
            commands::classifier::identify,
            commands::image::get_image_preview,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
