//! # seccheck-core
//!
//! Security checkpoints for a sandboxed kernel.
//!
//! Instrumented call sites ask the [`Registry`](registry::Registry) whether a
//! [`Point`](point::Point) is enabled (a single atomic load) and, only if it
//! is, build the event and hand it to the ordered chain of registered
//! [`Checker`](checker::Checker)s. Any checker may veto the operation by
//! returning an error; the chain stops at the first veto.
//!
//! - [`point`]: checkpoint identifiers and their bit positions.
//! - [`fields`]: per-kind field sets describing optional event members.
//! - [`info`]: in-process event payloads for process lifecycle checkpoints.
//! - [`checker`]: the checker capability trait and registration requests.
//! - [`registry`]: registration, enablement queries, and dispatch.
//! - [`callsite`]: helpers the kernel's syscall and lifecycle paths call.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod callsite;
pub mod checker;
pub mod fields;
pub mod info;
pub mod point;
pub mod registry;
mod seqcount;

pub use checker::{Checker, CheckerRequest, TaskContext};
pub use point::Point;
pub use registry::Registry;
