//! The annotation core: everything between the version-control collaborator
//! and the editor's decoration primitives.
//!
//! - `cache`: bounded attribution (LRU) and commit message (FIFO batch) caches
//! - `color`: revision → color by recency rank
//! - `correlate`: base → working line mapping
//! - `debounce`: per-document coalescing of UI events
//! - `inflight`: join-or-start registry for shared fetches
//! - `orchestrator`: `Annotator`, the progressive render pipeline
//! - `render`: decorations from attribution, mapping, and messages
//! - `template`: `${variable}` templates, compiled once per source

pub mod cache;
pub mod color;
pub mod correlate;
pub mod debounce;
pub mod inflight;
pub mod orchestrator;
pub mod render;
pub mod template;

pub use cache::{AttributionCache, CacheStats, DocumentKey, MessageCache};
pub use color::{RevisionColorEncoder, ThemeKind};
pub use correlate::{correlate, LineMapping, MappingCache};
pub use orchestrator::{Annotator, AnnotatorStats, DecorationHost};
pub use render::RenderingEngine;
pub use template::{CompiledTemplate, TemplateCompiler};
