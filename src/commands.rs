//! Tauri commands for the viewer.
//!
//! The viewer sits behind an async mutex. Commands release the lock before
//! awaiting a fetch or a render, so a later command can supersede either
//! while it is still running.

use crate::loader::{LoadError, SourceLocator};
use crate::pdf::DocumentInfo;
use crate::render::{AnnotationOverlay, RenderOutcome, RenderPhase, RenderTicket, TextOverlay};
use crate::viewer::{ViewState, Viewer};
use crate::viewport::DeviceRect;
use image::ImageFormat;
use serde::Serialize;
use std::io::Cursor;
use tauri::State;
use tokio::sync::Mutex;

pub struct AppState {
    pub viewer: Mutex<Viewer>,
}

impl AppState {
    pub fn new(viewer: Viewer) -> Self {
        Self {
            viewer: Mutex::new(viewer),
        }
    }
}

/// Result of a command that may have triggered a render.
#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub state: ViewState,
    /// Page whose render completed, if any
    pub rendered_page: Option<u32>,
    /// The render was replaced by a newer one before it finished
    pub superseded: bool,
}

/// Everything the frontend paints for the displayed page.
#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    /// Raster surface with markup, PNG encoded
    pub png: Vec<u8>,
    pub text: TextOverlay,
    pub annotations: AnnotationOverlay,
    pub phase: RenderPhase,
}

async fn settle(state: &AppState, ticket: Option<RenderTicket>) -> Result<ViewResponse, String> {
    let outcome = match ticket {
        Some(ticket) => Some(
            ticket
                .await
                .map_err(|e| e.to_string())?
                .map_err(|e| e.to_string())?,
        ),
        None => None,
    };

    let viewer = state.viewer.lock().await;
    Ok(ViewResponse {
        state: viewer.state(),
        rendered_page: match outcome {
            Some(RenderOutcome::Completed(frame)) => Some(frame.page_number),
            _ => None,
        },
        superseded: matches!(outcome, Some(RenderOutcome::Superseded)),
    })
}

/// Load outside the lock, then install the document if no newer open or
/// close happened meanwhile.
async fn open_with(state: &AppState, locator: SourceLocator) -> Result<ViewResponse, String> {
    let pending = state.viewer.lock().await.begin_open(locator);
    let fetched = pending.fetch().await;
    let opened = state.viewer.lock().await.finish_open(fetched);

    match opened {
        Ok(ticket) => settle(state, Some(ticket)).await,
        Err(LoadError::Superseded) => Ok(ViewResponse {
            state: state.viewer.lock().await.state(),
            rendered_page: None,
            superseded: true,
        }),
        Err(e) => Err(e.to_string()),
    }
}

/// Open a document from a URL or a file path.
#[tauri::command]
pub async fn open_document(
    locator: String,
    state: State<'_, AppState>,
) -> Result<ViewResponse, String> {
    open_with(&state, SourceLocator::parse(&locator)).await
}

/// Open a document from bytes (e.g., from drag-and-drop).
#[tauri::command]
pub async fn open_document_bytes(
    bytes: Vec<u8>,
    state: State<'_, AppState>,
) -> Result<ViewResponse, String> {
    open_with(&state, SourceLocator::from(bytes)).await
}

#[tauri::command]
pub async fn close_document(state: State<'_, AppState>) -> Result<ViewState, String> {
    let mut viewer = state.viewer.lock().await;
    viewer.close();
    Ok(viewer.state())
}

#[tauri::command]
pub async fn get_view_state(
    state: State<'_, AppState>,
) -> Result<(ViewState, Option<DocumentInfo>), String> {
    let viewer = state.viewer.lock().await;
    Ok((viewer.state(), viewer.document_info().cloned()))
}

#[tauri::command]
pub async fn go_to_previous(state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.go_to_previous();
    settle(&state, ticket).await
}

#[tauri::command]
pub async fn go_to_next(state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.go_to_next();
    settle(&state, ticket).await
}

/// Jump to a 1-based page. Out-of-range pages leave the view unchanged.
#[tauri::command]
pub async fn go_to_page(page: u32, state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.go_to_page(page);
    settle(&state, ticket).await
}

#[tauri::command]
pub async fn zoom_in(state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.zoom_in();
    settle(&state, ticket).await
}

#[tauri::command]
pub async fn zoom_out(state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.zoom_out();
    settle(&state, ticket).await
}

/// Render the current page again, e.g. after the window was restored.
#[tauri::command]
pub async fn rerender(state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.rerender();
    settle(&state, ticket).await
}

#[tauri::command]
pub async fn pointer_down(x: f32, y: f32, state: State<'_, AppState>) -> Result<(), String> {
    state.viewer.lock().await.pointer_down(x, y);
    Ok(())
}

/// Track the gesture. Returns the rectangle to preview, if drawing.
#[tauri::command]
pub async fn pointer_move(
    x: f32,
    y: f32,
    state: State<'_, AppState>,
) -> Result<Option<DeviceRect>, String> {
    Ok(state.viewer.lock().await.pointer_move(x, y))
}

#[tauri::command]
pub async fn pointer_up(x: f32, y: f32, state: State<'_, AppState>) -> Result<ViewResponse, String> {
    let ticket = state.viewer.lock().await.pointer_up(x, y);
    settle(&state, ticket).await
}

/// Snapshot the displayed page. `None` until a raster has been committed.
#[tauri::command]
pub async fn get_frame(state: State<'_, AppState>) -> Result<Option<FrameResponse>, String> {
    let viewer = state.viewer.lock().await;
    let phase = viewer.phase();
    let (frame, raster, text, annotations) = {
        let surfaces = viewer.surfaces();
        let snapshot = match (surfaces.raster.frame(), surfaces.raster.image()) {
            (Some(frame), Some(image)) => (
                *frame,
                image.clone(),
                surfaces.text.clone(),
                surfaces.annotations.clone(),
            ),
            _ => return Ok(None),
        };
        snapshot
    };
    drop(viewer);

    let mut png = Vec::new();
    raster
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| format!("Failed to encode PNG: {}", e))?;

    Ok(Some(FrameResponse {
        page_number: frame.page_number,
        width: frame.viewport.width,
        height: frame.viewport.height,
        scale: frame.viewport.scale,
        png,
        text,
        annotations,
        phase,
    }))
}

/// Text under a device-pixel rectangle of the displayed page.
#[tauri::command]
pub async fn get_selected_text(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    state: State<'_, AppState>,
) -> Result<String, String> {
    let viewer = state.viewer.lock().await;
    let selected = viewer
        .surfaces()
        .text
        .text_in(&DeviceRect::new(x, y, width, height));
    Ok(selected)
}
