//! API route handlers - maps HTTP endpoints to annotator operations.
//!
//! - `annotations`: render, clear, invalidate, toggle, theme, config, notices, stats
//! - `store`: the `DecorationHost` the handlers read decorations back from

pub mod annotations;
pub mod store;

use axum::Router;
use std::sync::Arc;

use crate::annotate::Annotator;
use annotations::AnnotationState;
use store::DecorationStore;

pub fn create_router(annotator: Arc<Annotator>, store: Arc<DecorationStore>) -> Router {
    Router::new().merge(annotations::routes(AnnotationState { annotator, store }))
}
