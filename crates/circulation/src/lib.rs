//! Circulation and penalty engine for a library back-office.
//!
//! The [`circulation`] module owns the loan lifecycle: identifier resolution
//! across ISBN and accession numbers, the concurrent-loan limit, penalty
//! accrual, and notification bucketing. The remaining modules carry the
//! configuration, telemetry, and error plumbing shared with the API service.

pub mod circulation;
pub mod config;
pub mod error;
pub mod telemetry;
