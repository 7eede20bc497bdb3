//! Progress-callback trait for pipeline stage events.
//!
//! Pass an [`Arc<dyn PipelineProgressCallback>`] in
//! [`crate::convert::ConvertOptions::progress`] to be told when each stage of
//! a conversion starts, finishes or fails. The CLI drives its spinner from
//! these events; a server could forward them to a channel instead.
//!
//! # Example
//!
//! ```rust
//! use pdf2graph::{PipelineProgressCallback, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback(AtomicUsize);
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, _output_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done", stage);
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

/// One step of a PDF → graph conversion, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// PDF text extraction.
    Extract,
    /// First provider call.
    Narrative,
    /// Second provider call plus JSON extraction.
    Graph,
    /// Writing the record to the store.
    Persist,
    /// Mermaid translation and CLI render.
    Render,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Extract => "Extracting text",
            Stage::Narrative => "Generating narrative",
            Stage::Graph => "Generating concept graph",
            Stage::Persist => "Saving graph",
            Stage::Render => "Rendering diagram",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by [`crate::convert`] as a conversion moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// `output_len` is the character count the stage produced (text, narrative,
    /// node count for the graph, 0 where it has no meaning).
    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let _ = (stage, output_len);
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
