//! Plain data types shared between the collaborator, the core, and routes.
//!
//! - `blame`: AttributionLine, Attribution (per-line authorship + base text)
//! - `commit`: CommitMessage (revision → message pairs from log queries)
//! - `decoration`: LineDecoration, DecorationSet, RenderPhase, Notice

pub mod blame;
pub mod commit;
pub mod decoration;

pub use blame::*;
pub use commit::*;
pub use decoration::*;
