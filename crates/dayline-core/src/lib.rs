//! # Dayline Core
//!
//! Pure reconciliation logic for Dayline: session and signal models,
//! signal splicing, session matching, meta-session grouping, per-day
//! reconciliation, signal statistics, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Persistence is
//! reached only through the [`store::Store`] trait.

pub mod error;
pub mod grouper;
pub mod matcher;
pub mod models;
pub mod reconcile;
pub mod splice;
pub mod stats;
pub mod store;

pub use error::ImportError;
