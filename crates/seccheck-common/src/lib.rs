//! # seccheck-common
//!
//! Shared error definitions, configuration models, and constants
//! used across the entire seccheck workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the foundational primitives that the
//! registry, the wire codec, the remote sender and the consumer build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
