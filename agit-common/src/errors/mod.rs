//! Error catalog and definitions for agit
//!
//! This module provides an error catalog with unique error codes,
//! categorized by subsystem. Each error includes remediation steps.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                              |
//! |------------|-------------|------------------------------------------|
//! | E001-E099  | Config      | Manifest and environment errors          |
//! | E100-E199  | Repository  | Working-copy convergence aborts          |
//! | E200-E299  | Credentials | SSH agent and wrapper lifecycle errors   |
//! | E300-E399  | Execution   | Command execution errors                 |
//! | E500-E599  | Internal    | Internal/unexpected errors               |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
