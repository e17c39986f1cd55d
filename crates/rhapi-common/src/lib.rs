//! RHAPI Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the RHAPI workspace.
//!
//! - **Wire contract**: [`types::Item`] and [`types::PagePayload`], the typed
//!   shape of a worker page response
//! - **Logging**: global `tracing` subscriber setup
//! - **Errors**: [`RhapiError`] for payload decoding
//!
//! # Example
//!
//! ```
//! use rhapi_common::types::PagePayload;
//!
//! let page = PagePayload::decode(br#"{"items": [{"id": "7", "name": "Halo"}], "version": "v2"}"#)?;
//! assert_eq!(page.items[0].id, "7");
//! # Ok::<(), rhapi_common::RhapiError>(())
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{Result, RhapiError};
