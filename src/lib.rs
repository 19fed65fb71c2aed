// Folio PDF Viewer
//
// Loads a document, paints the current page through PDFium and keeps a text
// overlay, an embedded-annotation overlay and user markup in sync with it.

pub mod config;
pub mod loader;
pub mod logging;
pub mod markup;
pub mod pdf;
pub mod render;
pub mod viewer;
pub mod viewport;

#[cfg(feature = "desktop")]
mod commands;

pub use config::ViewerConfig;
pub use loader::{DocumentHandle, LoadError, SourceLocator};
pub use markup::{AnnotationRecord, MarkupStyle};
pub use pdf::{PdfEngine, PdfiumEngine};
pub use render::{RenderError, RenderOutcome, RenderTicket};
pub use viewer::{ViewState, Viewer};

/// Check if a path is a valid PDF file.
fn is_pdf_file(path: &str) -> bool {
    let path = std::path::Path::new(path);
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
}

/// Find the document locator among launch arguments.
///
/// Accepts remote `http(s)` URLs, PDF paths, `file://` URLs (macOS passes
/// these) and percent-encoded paths. Flags are skipped.
pub fn locator_from_args<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    for arg in args {
        if arg.starts_with('-') {
            continue;
        }

        if arg.starts_with("http://") || arg.starts_with("https://") {
            log::debug!("Found remote document in args: {}", arg);
            return Some(arg);
        }

        if is_pdf_file(&arg) {
            log::debug!("Found PDF in args (direct): {}", arg);
            return Some(arg);
        }

        if arg.starts_with("file://") {
            if let Some(path) = url::Url::parse(&arg)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .and_then(|path| path.to_str().map(str::to_string))
            {
                if is_pdf_file(&path) {
                    log::debug!("Found PDF in args (file URL): {}", path);
                    return Some(path);
                }
            }
        }

        // Handle URL-encoded paths (e.g., spaces as %20)
        if let Ok(decoded) = urlencoding::decode(&arg) {
            if decoded != arg.as_str() && is_pdf_file(&decoded) {
                log::debug!("Found PDF in args (URL-decoded): {}", decoded);
                return Some(decoded.into_owned());
            }
        }
    }

    None
}

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use super::commands::{self, AppState};
    use super::{config::ViewerConfig, locator_from_args, logging, PdfiumEngine, Viewer};
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    use log::error;
    use log::info;
    use std::sync::{Arc, Mutex};
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    use tauri::{Emitter, RunEvent};

    /// The locator passed on launch (if any), handed to the frontend once.
    pub struct LaunchFile(pub Mutex<Option<String>>);

    /// Forward "Open With" requests to the frontend.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn handle_file_associations<R: tauri::Runtime>(
        app_handle: &tauri::AppHandle<R>,
        urls: Vec<url::Url>,
    ) {
        let args = urls.into_iter().map(|url| url.to_string());
        if let Some(locator) = locator_from_args(args) {
            info!("Opening {} from file association", locator);
            if let Err(e) = app_handle.emit("open-file", &locator) {
                error!("Failed to emit open-file event: {}", e);
            }
        }
    }

    /// Get the locator that was passed on launch (if any).
    /// Frontend calls this on startup to check if a document should be opened.
    #[tauri::command]
    fn get_launch_file(state: tauri::State<LaunchFile>) -> Option<String> {
        let mut guard = state.0.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        let config = ViewerConfig::load().unwrap_or_else(|e| {
            eprintln!("[Folio] {}; using defaults", e);
            ViewerConfig::default()
        });
        if let Err(e) = logging::init(&config) {
            eprintln!("[Folio] Failed to initialize logging: {}", e);
        }

        let launch_file =
            locator_from_args(std::env::args().skip(1)).or_else(|| config.default_source.clone());
        if let Some(ref locator) = launch_file {
            info!("Launch document: {}", locator);
        }

        let engine = Arc::new(PdfiumEngine::new());
        let app = tauri::Builder::default()
            .plugin(tauri_plugin_dialog::init())
            .manage(AppState::new(Viewer::new(engine, config)))
            .manage(LaunchFile(Mutex::new(launch_file)))
            .invoke_handler(tauri::generate_handler![
                get_launch_file,
                commands::open_document,
                commands::open_document_bytes,
                commands::close_document,
                commands::get_view_state,
                commands::go_to_previous,
                commands::go_to_next,
                commands::go_to_page,
                commands::zoom_in,
                commands::zoom_out,
                commands::rerender,
                commands::pointer_down,
                commands::pointer_move,
                commands::pointer_up,
                commands::get_frame,
                commands::get_selected_text,
            ])
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(|_app_handle, _event| {
            // Handle macOS "Open With" / double-click file associations
            #[cfg(any(target_os = "macos", target_os = "ios"))]
            if let RunEvent::Opened { urls } = _event {
                handle_file_associations(_app_handle, urls);
            }
        });
    }
}
