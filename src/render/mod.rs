//! Page rendering: raster, text overlay, annotation overlay, then markup.

mod pipeline;
mod surfaces;
mod task;

pub use pipeline::{
    PageRenderer, RenderError, RenderOutcome, RenderPhase, RenderRequest, RenderTicket,
};
pub use surfaces::{
    AnnotationElement, AnnotationOverlay, RasterSurface, Stage, Surfaces, TextOverlay, TextSpan,
};
pub use task::{CancellationToken, TaskHandle};
