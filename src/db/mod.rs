//! Database module for the scan queue
//!
//! Provides the `JobStore` seam the worker talks to and its PostgreSQL
//! implementation over the `scans` table.

pub mod models;
pub mod scans;

pub use models::*;
pub use scans::{JobStore, PgJobStore};
