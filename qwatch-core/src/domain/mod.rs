//! Core domain types
//!
//! These types represent the rows the console renders and are shared between
//! the client adapters (which produce them) and the engine/renderers (which
//! enrich and display them).

pub mod job;
