//! Progressive per-line version-control annotation.
//!
//! `Annotator` drives the pipeline; `GitRepository` supplies attribution and
//! commit messages; the HTTP routes expose the editor-facing operations.

pub mod annotate;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod routes;
