//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → access_control.rs (deny list, then allow list)
//!     → Proceed to SSLRequest detection, or decline untouched
//! ```
//!
//! # Design Decisions
//! - Declining is not rejecting: the raw connection is handed back open
//! - Open by default: empty lists restrict nothing

pub mod access_control;

pub use access_control::{AddressFilter, FilterDecision};
