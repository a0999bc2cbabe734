//! Shared test utilities for upqueue integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an engine to an in-memory database and a movable clock
//! - Scripted fakes for the uploader and the notifier
//! - `FileHost`, an in-process HTTP file host that records what it receives

pub mod fakes;
pub mod harness;
pub mod host;

pub use fakes::*;
pub use host::{FileHost, ReceivedRequest};
pub use harness::TestHarness;
