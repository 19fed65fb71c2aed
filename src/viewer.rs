//! Navigation and zoom controller.
//!
//! The viewer owns the view state and is the only thing that mutates it.
//! Every command that changes what should be on screen issues exactly one
//! render request; commands that change nothing return `None` and leave any
//! in-flight render alone.

use crate::config::ViewerConfig;
use crate::loader::{DocumentHandle, DocumentLoader, LoadError, SourceLocator};
use crate::markup::MarkupLayer;
use crate::pdf::{DocumentInfo, PdfEngine};
use crate::render::{PageRenderer, RenderPhase, RenderRequest, RenderTicket, Surfaces};
use crate::viewport::DeviceRect;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, MutexGuard};

/// What the toolbar shows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    /// 1-based, always within `[1, max(total_pages, 1)]`
    pub current_page: u32,
    pub total_pages: u32,
    pub zoom: f32,
}

/// An open request whose fetch runs without borrowing the viewer.
///
/// Produced by [`Viewer::begin_open`]; hand the result of
/// [`PendingOpen::fetch`] back to [`Viewer::finish_open`].
pub struct PendingOpen {
    generation: u64,
    loader: DocumentLoader,
    locator: SourceLocator,
}

impl PendingOpen {
    pub async fn fetch(self) -> FetchedDocument {
        FetchedDocument {
            generation: self.generation,
            result: self.loader.load(self.locator).await,
        }
    }
}

/// Outcome of a [`PendingOpen`] fetch, tagged with the open it belongs to.
pub struct FetchedDocument {
    generation: u64,
    result: Result<DocumentHandle, LoadError>,
}

pub struct Viewer {
    config: ViewerConfig,
    loader: DocumentLoader,
    renderer: PageRenderer,
    markup: MarkupLayer,
    document: Option<DocumentHandle>,
    state: ViewState,
    /// Bumped on every open and close; stale fetches are dropped
    generation: u64,
}

impl Viewer {
    pub fn new(engine: Arc<dyn PdfEngine>, config: ViewerConfig) -> Self {
        let loader = DocumentLoader::new(
            Arc::clone(&engine),
            config.http_timeout(),
            config.max_document_bytes,
        );
        let state = ViewState {
            current_page: 1,
            total_pages: 0,
            zoom: config.initial_zoom,
        };
        Self {
            loader,
            renderer: PageRenderer::new(engine),
            markup: MarkupLayer::new(),
            document: None,
            state,
            config,
            generation: 0,
        }
    }

    /// Load a document and render its first page.
    ///
    /// Whatever was open before is discarded, whether or not the load
    /// succeeds.
    pub async fn open(&mut self, locator: SourceLocator) -> Result<RenderTicket, LoadError> {
        let fetched = self.begin_open(locator).fetch().await;
        self.finish_open(fetched)
    }

    /// Close the current document and prepare to load `locator`.
    ///
    /// Any open still in flight is superseded.
    pub fn begin_open(&mut self, locator: SourceLocator) -> PendingOpen {
        self.close();
        PendingOpen {
            generation: self.generation,
            loader: self.loader.clone(),
            locator,
        }
    }

    /// Install a fetched document and render its first page.
    ///
    /// Fails with [`LoadError::Superseded`] when another open or a close
    /// happened since the matching [`begin_open`](Self::begin_open).
    pub fn finish_open(&mut self, fetched: FetchedDocument) -> Result<RenderTicket, LoadError> {
        if fetched.generation != self.generation {
            debug!("Dropping stale load #{}", fetched.generation);
            return Err(LoadError::Superseded);
        }

        let document = fetched.result.map_err(|e| {
            warn!("Load failed: {}", e);
            e
        })?;

        self.state.total_pages = document.page_count();
        self.state.current_page = 1;
        self.document = Some(document.clone());
        Ok(self.render(document))
    }

    /// Discard the document, cancel rendering and blank the surfaces.
    pub fn close(&mut self) {
        self.generation += 1;
        if let Some(document) = self.document.take() {
            debug!("Closing {}", document.origin());
        }
        self.renderer.reset();
        self.markup.clear();
        self.state.current_page = 1;
        self.state.total_pages = 0;
    }

    pub fn go_to_previous(&mut self) -> Option<RenderTicket> {
        let target = self.state.current_page.saturating_sub(1).max(1);
        self.navigate(target)
    }

    pub fn go_to_next(&mut self) -> Option<RenderTicket> {
        let target = self
            .state
            .current_page
            .saturating_add(1)
            .min(self.state.total_pages.max(1));
        self.navigate(target)
    }

    /// Jump to `page`. Out-of-range pages are ignored.
    pub fn go_to_page(&mut self, page: u32) -> Option<RenderTicket> {
        if page < 1 || page > self.state.total_pages {
            debug!(
                "Ignoring jump to page {} of {}",
                page, self.state.total_pages
            );
            return None;
        }
        self.state.current_page = page;
        self.render_if_open()
    }

    pub fn zoom_in(&mut self) -> Option<RenderTicket> {
        self.set_zoom(self.state.zoom + self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> Option<RenderTicket> {
        self.set_zoom(self.state.zoom - self.config.zoom_step)
    }

    /// Set the zoom factor, clamped to the configured bounds.
    pub fn set_zoom(&mut self, zoom: f32) -> Option<RenderTicket> {
        if !zoom.is_finite() {
            return None;
        }
        let zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        if zoom == self.state.zoom {
            return None;
        }
        self.state.zoom = zoom;
        self.render_if_open()
    }

    /// Render the current page again, e.g. after the window was restored.
    pub fn rerender(&mut self) -> Option<RenderTicket> {
        self.render_if_open()
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.markup.pointer_down(x, y);
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> Option<DeviceRect> {
        self.markup.pointer_move(x, y)
    }

    /// Finish a markup gesture and redraw the page with it.
    pub fn pointer_up(&mut self, x: f32, y: f32) -> Option<RenderTicket> {
        self.markup.pointer_up(x, y)?;
        self.render_if_open()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.document.as_ref().map(DocumentHandle::info)
    }

    pub fn markup(&self) -> &MarkupLayer {
        &self.markup
    }

    pub fn phase(&self) -> RenderPhase {
        self.renderer.phase()
    }

    pub fn surfaces(&self) -> MutexGuard<'_, Surfaces> {
        self.renderer.surfaces()
    }

    fn navigate(&mut self, target: u32) -> Option<RenderTicket> {
        if self.document.is_none()
            || self.state.total_pages == 0
            || target == self.state.current_page
        {
            return None;
        }
        self.state.current_page = target;
        self.render_if_open()
    }

    /// Render the current page, unless there is no page to show.
    fn render_if_open(&mut self) -> Option<RenderTicket> {
        let document = self.document.clone()?;
        if document.page_count() == 0 {
            return None;
        }
        Some(self.render(document))
    }

    fn render(&mut self, document: DocumentHandle) -> RenderTicket {
        self.renderer.render(RenderRequest {
            document,
            page_number: self.state.current_page,
            zoom: self.state.zoom,
            markup: self.markup.records().to_vec(),
            style: self.config.markup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fake::FakeEngine;
    use crate::loader::serve_once;
    use crate::render::{RenderError, RenderOutcome, Stage};
    use image::Rgba;
    use std::time::Duration;

    fn viewer_with(engine: FakeEngine) -> Viewer {
        Viewer::new(Arc::new(engine), ViewerConfig::default())
    }

    async fn open(pages: u32) -> Viewer {
        let mut viewer = viewer_with(FakeEngine::new());
        let ticket = viewer.open(FakeEngine::document(pages).into()).await.unwrap();
        ticket.await.unwrap().unwrap();
        viewer
    }

    async fn completed(ticket: Option<RenderTicket>) -> crate::viewport::RenderFrame {
        match ticket.expect("render expected").await.unwrap().unwrap() {
            RenderOutcome::Completed(frame) => frame,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_renders_first_page() {
        let viewer = open(3).await;
        assert_eq!(
            viewer.state(),
            ViewState {
                current_page: 1,
                total_pages: 3,
                zoom: 1.5
            }
        );
        assert_eq!(viewer.surfaces().displayed_page(), Some(1));
        assert_eq!(viewer.document_info().unwrap().page_count, 3);
    }

    #[tokio::test]
    async fn test_previous_and_next_clamp() {
        let mut viewer = open(2).await;

        assert!(viewer.go_to_previous().is_none());
        assert_eq!(viewer.state().current_page, 1);

        let frame = completed(viewer.go_to_next()).await;
        assert_eq!(frame.page_number, 2);
        assert!(viewer.go_to_next().is_none());
        assert_eq!(viewer.state().current_page, 2);

        let frame = completed(viewer.go_to_previous()).await;
        assert_eq!(frame.page_number, 1);
    }

    #[tokio::test]
    async fn test_go_to_page_out_of_range_is_noop() {
        let mut viewer = open(4).await;
        assert!(viewer.go_to_page(0).is_none());
        assert!(viewer.go_to_page(5).is_none());
        assert_eq!(viewer.state().current_page, 1);

        let frame = completed(viewer.go_to_page(4)).await;
        assert_eq!(frame.page_number, 4);
        assert_eq!(viewer.state().current_page, 4);
    }

    #[tokio::test]
    async fn test_every_page_renders_at_zoomed_size() {
        let engine = FakeEngine::new().with_page_size(1, 400.0, 300.0);
        let mut viewer = viewer_with(engine);
        viewer
            .open(FakeEngine::document(3).into())
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        for (page, size) in [(1, (612.0, 792.0)), (2, (400.0, 300.0)), (3, (612.0, 792.0))] {
            let frame = completed(viewer.go_to_page(page)).await;
            let zoom = viewer.state().zoom;
            assert_eq!(frame.viewport.width, (size.0 * zoom) as u32);
            assert_eq!(frame.viewport.height, (size.1 * zoom) as u32);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rapid_jumps_show_last_page() {
        let engine = FakeEngine::new().with_raster_delay(2, Duration::from_millis(150));
        let mut viewer = viewer_with(engine);
        viewer
            .open(FakeEngine::document(6).into())
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let third = viewer.go_to_page(3).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fifth = viewer.go_to_page(5).unwrap();

        let frame = completed(Some(fifth)).await;
        assert_eq!(frame.page_number, 5);
        assert_eq!(third.await.unwrap().unwrap(), RenderOutcome::Superseded);

        let surfaces = viewer.surfaces();
        assert_eq!(surfaces.displayed_page(), Some(5));
        assert_eq!(surfaces.text.spans[0].text, "Page 5");
        assert_eq!(viewer.state().current_page, 5);
    }

    #[tokio::test]
    async fn test_zoom_sequence() {
        let mut viewer = open(1).await;

        let mut zooms = Vec::new();
        zooms.push(completed(viewer.zoom_in()).await.viewport.scale);
        zooms.push(completed(viewer.zoom_in()).await.viewport.scale);
        zooms.push(completed(viewer.zoom_out()).await.viewport.scale);
        assert_eq!(zooms, vec![2.0, 2.5, 2.0]);
        assert_eq!(viewer.state().zoom, 2.0);
    }

    #[tokio::test]
    async fn test_rapid_zoom_keeps_only_last_render() {
        let mut viewer = open(1).await;

        let tickets = [viewer.zoom_in(), viewer.zoom_in(), viewer.zoom_out()];
        let mut outcomes = Vec::new();
        for ticket in tickets {
            outcomes.push(ticket.expect("zoom renders").await.unwrap().unwrap());
        }
        assert_eq!(outcomes[0], RenderOutcome::Superseded);
        assert_eq!(outcomes[1], RenderOutcome::Superseded);
        assert!(matches!(outcomes[2], RenderOutcome::Completed(f) if f.viewport.scale == 2.0));
        assert_eq!(viewer.state().zoom, 2.0);
        assert_eq!(viewer.surfaces().raster.frame().unwrap().viewport.scale, 2.0);
    }

    #[tokio::test]
    async fn test_zoom_is_clamped() {
        let mut viewer = open(1).await;
        let mut renders = 0;
        while let Some(ticket) = viewer.zoom_out() {
            ticket.await.unwrap().unwrap();
            renders += 1;
        }
        // 1.5 -> 1.0 -> 0.5 -> 0.25
        assert_eq!(renders, 3);
        assert_eq!(viewer.state().zoom, 0.25);
        assert!(viewer.set_zoom(f32::NAN).is_none());
        assert!(viewer.set_zoom(-3.0).is_none());

        let frame = completed(viewer.set_zoom(100.0)).await;
        assert_eq!(frame.viewport.scale, 10.0);
    }

    #[tokio::test]
    async fn test_markup_gesture_redraws_page() {
        let mut viewer = open(2).await;
        viewer.set_zoom(1.0).unwrap().await.unwrap().unwrap();

        viewer.pointer_down(10.0, 10.0);
        assert_eq!(
            viewer.pointer_move(40.0, 20.0),
            Some(DeviceRect::new(10.0, 10.0, 30.0, 10.0))
        );
        completed(viewer.pointer_up(60.0, 40.0)).await;
        assert_eq!(viewer.markup().records().len(), 1);

        // Re-rendering keeps the markup on top of the fresh raster
        completed(viewer.rerender()).await;
        let surfaces = viewer.surfaces();
        assert_eq!(
            surfaces.composition(),
            &[Stage::Raster, Stage::Text, Stage::Annotations, Stage::Markup]
        );
        let image = surfaces.raster.image().unwrap();
        for (x, y) in [(10, 10), (60, 10), (10, 40), (60, 40), (35, 10)] {
            assert_eq!(*image.get_pixel(x, y), Rgba([255, 0, 0, 255]));
        }
        assert_eq!(*image.get_pixel(35, 25), Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_markup_survives_navigation() {
        let mut viewer = open(2).await;
        viewer.set_zoom(1.0).unwrap().await.unwrap().unwrap();
        viewer.pointer_down(10.0, 10.0);
        completed(viewer.pointer_up(60.0, 40.0)).await;

        completed(viewer.go_to_next()).await;
        let surfaces = viewer.surfaces();
        assert_eq!(surfaces.displayed_page(), Some(2));
        let image = surfaces.raster.image().unwrap();
        assert_eq!(*image.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_nothing_open() {
        let mut viewer = open(3).await;
        viewer.pointer_down(0.0, 0.0);
        viewer.pointer_up(5.0, 5.0).unwrap().await.unwrap().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = viewer
            .open(SourceLocator::Path(dir.path().join("missing.pdf")))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));

        assert_eq!(viewer.state().total_pages, 0);
        assert_eq!(viewer.state().current_page, 1);
        assert!(viewer.document_info().is_none());
        assert!(viewer.markup().records().is_empty());
        assert_eq!(viewer.surfaces().displayed_page(), None);
        assert!(viewer.go_to_next().is_none());
        assert!(viewer.go_to_previous().is_none());
        assert!(viewer.go_to_page(1).is_none());
        assert!(viewer.zoom_in().is_none());
        assert_eq!(viewer.state().zoom, 2.0);
    }

    #[tokio::test]
    async fn test_empty_document_keeps_page_in_range() {
        let mut viewer = viewer_with(FakeEngine::new());
        let ticket = viewer.open(FakeEngine::document(0).into()).await.unwrap();
        let err = ticket.await.unwrap().unwrap_err();
        assert!(matches!(err, RenderError::InvalidPage { page: 1 }));

        let empty = ViewState {
            current_page: 1,
            total_pages: 0,
            zoom: 1.5,
        };
        assert_eq!(viewer.state(), empty);
        assert!(viewer.go_to_next().is_none());
        assert!(viewer.go_to_previous().is_none());
        assert!(viewer.go_to_page(1).is_none());
        assert!(viewer.rerender().is_none());
        assert_eq!(viewer.state(), empty);

        assert!(viewer.zoom_in().is_none());
        assert_eq!(viewer.state().zoom, 2.0);
        assert_eq!(viewer.state().current_page, 1);
    }

    #[tokio::test]
    async fn test_http_404_leaves_nothing_open() {
        let url = serve_once("HTTP/1.1 404 Not Found", b"");
        let mut viewer = open(2).await;

        let err = viewer.open(SourceLocator::parse(&url)).await.unwrap_err();
        assert!(matches!(err, LoadError::Http { status: 404, .. }), "{:?}", err);
        assert_eq!(viewer.state().total_pages, 0);
        assert_eq!(viewer.state().current_page, 1);
        assert_eq!(viewer.surfaces().displayed_page(), None);
        assert!(viewer.go_to_previous().is_none());
        assert!(viewer.go_to_next().is_none());
    }

    #[tokio::test]
    async fn test_viewer_stays_usable_while_loading() {
        let mut viewer = open(2).await;

        let pending = viewer.begin_open(FakeEngine::document(4).into());
        // The old document is gone, but the viewer still answers commands
        assert_eq!(viewer.state().total_pages, 0);
        assert!(viewer.go_to_next().is_none());
        assert!(viewer.zoom_in().is_none());

        let ticket = viewer.finish_open(pending.fetch().await).unwrap();
        assert!(matches!(
            ticket.await.unwrap().unwrap(),
            RenderOutcome::Completed(f) if f.viewport.scale == 2.0
        ));
        assert_eq!(viewer.state().total_pages, 4);
    }

    #[tokio::test]
    async fn test_newer_open_supersedes_older() {
        let mut viewer = viewer_with(FakeEngine::new());

        let first = viewer.begin_open(FakeEngine::document(3).into());
        let second = viewer.begin_open(FakeEngine::document(5).into());

        let (first, second) = (first.fetch().await, second.fetch().await);
        viewer
            .finish_open(second)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            viewer.finish_open(first),
            Err(LoadError::Superseded)
        ));
        assert_eq!(viewer.state().total_pages, 5);
        assert_eq!(viewer.surfaces().displayed_page(), Some(1));

        // A close also invalidates an open in flight
        let pending = viewer.begin_open(FakeEngine::document(2).into());
        viewer.close();
        assert!(matches!(
            viewer.finish_open(pending.fetch().await),
            Err(LoadError::Superseded)
        ));
        assert_eq!(viewer.state().total_pages, 0);
        assert!(viewer.document_info().is_none());
    }

    #[tokio::test]
    async fn test_no_document_commands_are_noops() {
        let mut viewer = viewer_with(FakeEngine::new());
        assert!(viewer.go_to_next().is_none());
        assert!(viewer.go_to_previous().is_none());
        assert!(viewer.go_to_page(1).is_none());
        viewer.pointer_down(1.0, 1.0);
        assert!(viewer.pointer_up(2.0, 2.0).is_none());
        assert_eq!(viewer.state().current_page, 1);
    }
}
