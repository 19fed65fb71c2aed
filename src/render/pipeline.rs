//! Four-stage page render pipeline with supersession.

use super::surfaces::{Stage, Surfaces};
use super::task::{CancellationToken, TaskHandle};
use crate::loader::DocumentHandle;
use crate::markup::{AnnotationRecord, MarkupStyle};
use crate::pdf::{PdfEngine, PdfError};
use crate::viewport::{RenderFrame, RenderId, Viewport};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors that abort a render request.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Page {page} is outside the document")]
    InvalidPage { page: u32 },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: PdfError,
    },

    #[error("{stage} worker stopped: {detail}")]
    Worker { stage: Stage, detail: String },
}

impl Serialize for RenderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Where the renderer currently is for its latest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    Idle,
    Rastering,
    TextLayering,
    AnnotationLayering,
    MarkupDrawing,
}

/// How a render request ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderOutcome {
    /// All four stages wrote their surfaces.
    Completed(RenderFrame),
    /// A newer request took over before this one finished.
    Superseded,
}

/// Awaitable result of one render request.
pub type RenderTicket = JoinHandle<Result<RenderOutcome, RenderError>>;

/// Everything a render pass needs, captured at request time.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub document: DocumentHandle,
    /// 1-based page number
    pub page_number: u32,
    pub zoom: f32,
    pub markup: Vec<AnnotationRecord>,
    pub style: MarkupStyle,
}

struct Shared {
    surfaces: Mutex<Surfaces>,
    latest: AtomicU64,
    phase: Mutex<RenderPhase>,
}

impl Shared {
    fn surfaces(&self) -> MutexGuard<'_, Surfaces> {
        self.surfaces.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_latest(&self, id: RenderId) -> bool {
        self.latest.load(Ordering::Acquire) == id.0
    }

    fn set_phase(&self, id: RenderId, phase: RenderPhase) {
        let mut current = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_latest(id) {
            *current = phase;
        }
    }

    /// Run `write` on the surfaces unless the task was superseded.
    ///
    /// The token is checked while the surface lock is held, so once a newer
    /// request has been issued no write from this task can land.
    fn commit(
        &self,
        token: &CancellationToken,
        stage: Stage,
        write: impl FnOnce(&mut Surfaces),
    ) -> bool {
        let mut surfaces = self.surfaces();
        if token.is_cancelled() {
            return false;
        }
        write(&mut surfaces);
        surfaces.record(stage);
        true
    }
}

/// Produces the composited page and supersedes stale work.
pub struct PageRenderer {
    engine: Arc<dyn PdfEngine>,
    shared: Arc<Shared>,
    next_id: u64,
    current: Option<TaskHandle>,
}

impl PageRenderer {
    pub fn new(engine: Arc<dyn PdfEngine>) -> Self {
        Self {
            engine,
            shared: Arc::new(Shared {
                surfaces: Mutex::new(Surfaces::default()),
                latest: AtomicU64::new(0),
                phase: Mutex::new(RenderPhase::Idle),
            }),
            next_id: 0,
            current: None,
        }
    }

    /// Start rendering `request`, cancelling any render still in flight.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn render(&mut self, request: RenderRequest) -> RenderTicket {
        self.cancel();

        self.next_id += 1;
        let id = RenderId(self.next_id);
        let (handle, token) = TaskHandle::new(id, request.page_number);
        self.shared.latest.store(id.0, Ordering::Release);
        self.current = Some(handle);

        debug!(
            "Render {:?}: page {} at zoom {}",
            id, request.page_number, request.zoom
        );

        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = match run_pipeline(engine, &shared, id, &token, request).await {
                // Failures after supersession are not reported
                Err(e) if token.is_cancelled() => {
                    debug!("Render {:?} failed after being superseded: {}", id, e);
                    Ok(RenderOutcome::Superseded)
                }
                other => other,
            };
            shared.set_phase(id, RenderPhase::Idle);
            match &result {
                Ok(RenderOutcome::Superseded) => debug!("Render {:?} superseded", id),
                Ok(RenderOutcome::Completed(frame)) => {
                    debug!("Render {:?} completed page {}", id, frame.page_number)
                }
                Err(e) => error!("Render {:?} failed: {}", id, e),
            }
            result
        })
    }

    /// Cancel the in-flight render, if any. Surfaces keep their content.
    pub fn cancel(&mut self) {
        if let Some(task) = self.current.take() {
            if !task.is_cancelled() {
                debug!("Cancelling render {:?} of page {}", task.id, task.page_number);
            }
            task.cancel();
            // Nothing newer is running yet
            self.shared.set_phase(task.id, RenderPhase::Idle);
        }
    }

    /// Cancel rendering and blank all surfaces.
    pub fn reset(&mut self) {
        self.cancel();
        self.shared.surfaces().clear();
    }

    pub fn phase(&self) -> RenderPhase {
        *self.shared.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn surfaces(&self) -> MutexGuard<'_, Surfaces> {
        self.shared.surfaces()
    }
}

/// Run one engine call on the blocking pool.
async fn on_worker<T, F>(stage: Stage, work: F) -> Result<T, RenderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PdfError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RenderError::Worker {
            stage,
            detail: e.to_string(),
        })?
        .map_err(|source| RenderError::Stage { stage, source })
}

async fn run_pipeline(
    engine: Arc<dyn PdfEngine>,
    shared: &Shared,
    id: RenderId,
    token: &CancellationToken,
    request: RenderRequest,
) -> Result<RenderOutcome, RenderError> {
    let RenderRequest {
        document,
        page_number,
        zoom,
        markup,
        style,
    } = request;

    if page_number == 0 || page_number > document.page_count() {
        return Err(RenderError::InvalidPage { page: page_number });
    }
    let page_index = page_number - 1;
    let bytes = document.bytes();

    macro_rules! checkpoint {
        ($phase:expr) => {
            if token.is_cancelled() {
                return Ok(RenderOutcome::Superseded);
            }
            shared.set_phase(id, $phase);
        };
    }

    // Raster
    checkpoint!(RenderPhase::Rastering);
    let page = {
        let (engine, bytes) = (Arc::clone(&engine), Arc::clone(&bytes));
        on_worker(Stage::Raster, move || engine.page_info(&bytes, page_index)).await?
    };
    let frame = RenderFrame {
        id,
        page_number,
        viewport: Viewport::new(&page, zoom),
    };
    if token.is_cancelled() {
        return Ok(RenderOutcome::Superseded);
    }
    let image = {
        let (engine, bytes) = (Arc::clone(&engine), Arc::clone(&bytes));
        let (width, height) = (frame.viewport.width, frame.viewport.height);
        on_worker(Stage::Raster, move || {
            engine.rasterize(&bytes, page_index, width, height)
        })
        .await?
    };
    if !shared.commit(token, Stage::Raster, |s| s.raster.replace(frame, image)) {
        return Ok(RenderOutcome::Superseded);
    }

    // Text
    checkpoint!(RenderPhase::TextLayering);
    let chars = {
        let (engine, bytes) = (Arc::clone(&engine), Arc::clone(&bytes));
        on_worker(Stage::Text, move || engine.text_content(&bytes, page_index)).await?
    };
    if !shared.commit(token, Stage::Text, |s| s.text.layout(&frame, &chars)) {
        return Ok(RenderOutcome::Superseded);
    }

    // Interactive annotations
    checkpoint!(RenderPhase::AnnotationLayering);
    let annotations = {
        let (engine, bytes) = (Arc::clone(&engine), Arc::clone(&bytes));
        on_worker(Stage::Annotations, move || {
            engine.annotations(&bytes, page_index)
        })
        .await?
    };
    if !shared.commit(token, Stage::Annotations, |s| {
        s.annotations.layout(&frame, &annotations)
    }) {
        return Ok(RenderOutcome::Superseded);
    }

    // User markup
    checkpoint!(RenderPhase::MarkupDrawing);
    if !shared.commit(token, Stage::Markup, |s| {
        s.raster.draw_markup(&markup, &style)
    }) {
        return Ok(RenderOutcome::Superseded);
    }

    Ok(RenderOutcome::Completed(frame))
}
