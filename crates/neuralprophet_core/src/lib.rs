//! # neuralprophet_core
//!
//! Core types shared by the neuralprophet-rs crates.
//!
//! This crate provides:
//! - [`Seed`] for deterministic parameter initialization and shuffling
//! - [`Frequency`] for stepping and inferring the spacing of `ds` timestamps
//! - [`Split`] to tag data as train, validation or test
//! - Error types and common utilities
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use neuralprophet_core::{Frequency, Seed};
//!
//! let seed = Seed::new(42);
//! let freq: Frequency = "D".parse().unwrap();
//! let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! assert_eq!(freq.advance(start, 1).date(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
//! # let _ = seed;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod frequency;
mod seed;
mod split;

pub use error::{CoreError, Result};
pub use frequency::{infer_frequency, Frequency};
pub use seed::Seed;
pub use split::Split;
