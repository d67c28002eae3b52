// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session orchestrator and mutation-gated tool runtime (§4.5).
//!
//! Two independent responsibilities share this crate because they share a
//! lifecycle and a cancellation model, not because one calls the other:
//!
//! - [`orchestrator::SessionOrchestrator`] drives the bounded conversational
//!   per-turn protocol over a [`registry::SessionRegistry`] — prepare,
//!   send, validate, repair-once, finalize.
//! - [`tools::ToolRuntime`] gates every mutating tool call a turn's response
//!   asks for through the trust-tier protocol (§4.5's "Tool runtime
//!   contract", §4.6), independent of whether that turn went through a
//!   [`validate::MicroRunner`] at all.
//!
//! Neither type calls the other: a caller (`fleet-server`) runs a turn
//! through the orchestrator, inspects the response for tool calls, and
//! dispatches each one through the tool runtime itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The generative backend capability boundary (§1, §4.5).
pub mod chat;
/// Cancellation primitives for an in-flight chat turn.
pub mod cancel;
/// Error type for the session orchestrator and tool runtime.
pub mod error;
/// Trace spans and a runtime observer for per-turn audit entries.
pub mod observe;
/// The per-turn protocol driver.
pub mod orchestrator;
/// Periodic eviction of stale chat sessions.
pub mod reaper;
/// In-memory registry of live chat sessions.
pub mod registry;
/// The mutation-gating tool runtime.
pub mod tools;
/// Response validation against a task contract.
pub mod validate;

pub use chat::ChatBackend;
pub use error::SessionError;
pub use orchestrator::{SessionOrchestrator, TurnOutcome};
pub use registry::SessionRegistry;
pub use tools::{ToolOutcome, ToolRuntime};
pub use validate::{GatedContext, MicroRunner, RuleGatedRunner, TaskContract, ValidationReceipt};
