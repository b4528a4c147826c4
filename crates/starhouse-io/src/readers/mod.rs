//! Readers that turn raw source objects into rows.
//!
//! NOTE: only the JSON shapes used by the warehouse COPY statements are
//! supported: auto-mapped objects and JSONPaths projections.

pub mod json;
