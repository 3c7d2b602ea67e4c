//! qwatch Core
//!
//! Core types and helpers for the qwatch console.
//!
//! This crate contains:
//! - Domain types: job summary rows and cached runtime job views
//! - Status helpers: terminal classification, display mapping, colors
//! - Time helpers: relative created-age formatting

pub mod domain;
pub mod status;
pub mod timefmt;
