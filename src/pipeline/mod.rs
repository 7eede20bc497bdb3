//! Pipeline stages for PDF-to-concept-graph conversion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable without a provider or the Mermaid CLI.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ validate ──▶ (provider) ──▶ extract ──▶ mermaid ──▶ render
//! (PDF text)  (bound)       (LLM)       (JSON)      (text)      (mmdc)
//! ```
//!
//! 1. [`input`]    — resolve a path or URL and read the PDF text layer;
//!    extraction runs in `spawn_blocking`
//! 2. [`validate`] — flag mangled numbers and bound the text length
//! 3. [`extract`]  — recover the first graph-shaped JSON object from free-form
//!    model output
//! 4. [`mermaid`]  — translate the graph into flowchart text (pure)
//! 5. [`render`]   — run the Mermaid CLI; the only stage that spawns processes
//!
//! The provider calls between 2 and 3 live in [`crate::provider`] and are
//! sequenced by [`crate::processor::GraphProcessor`].

pub mod extract;
pub mod input;
pub mod mermaid;
pub mod render;
pub mod validate;
