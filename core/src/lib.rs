//! # chatloop-core
//!
//! Streaming chat execution with automatic function calling.
//!
//! `chatloop-core` turns a single [`ChatRequest`] into a live, cancellable, multi-turn exchange
//! with a language model. A [`Provider`] adapter streams text fragments and discrete
//! [`Message`]s into the [`Engine`]; the engine forwards both to the caller, resolves every
//! [`FunctionInvocation`] the model makes (optionally behind human approval), feeds the
//! return values back and keeps going until a turn finishes without invocations.
//!
//! ```text
//! ┌──────────────┐  ChatRequest   ┌──────────────────┐  stream()   ┌─────────────┐
//! │   Your App   │───────────────▶│      Engine      │────────────▶│  Provider   │
//! │              │◀── text ───────│                  │◀── text ────│  adapter    │
//! │              │◀── messages ───│ resolve + approve│◀── message ─│             │
//! └──────────────┘                └──────────────────┘             └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`message`] — the closed set of conversation messages and the adjacency rule.
//! - [`request`] — immutable chat requests.
//! - [`schema`] — type descriptors and the JSON Schema generator.
//! - [`function`] — function descriptors, the [`Tool`] trait and the [`Functions`] registry.
//! - [`approval`] — human-in-the-loop approval handlers.
//! - [`provider`] — the contract provider adapters implement.
//! - [`engine`] — the turn loop, the execution handle and its two output streams.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatloop_core::{ChatRequest, Engine, Function, Message};
//! use futures_lite::StreamExt;
//!
//! let weather = Function::declare("get_weather", "Current weather for a city", schema)
//!     .with_implementation(|_args| async { Ok("20 degrees".to_string()) });
//!
//! let request = ChatRequest::new([Message::user("How warm is it in Amsterdam?")])
//!     .with_function(weather);
//!
//! let mut execution = Engine::new(provider, executor).execute(request);
//! let mut text = execution.text_segments().unwrap();
//! while let Some(segment) = text.next().await {
//!     print!("{}", segment?);
//! }
//! ```

pub mod approval;
mod cancel;
pub mod engine;
mod error;
pub mod function;
pub mod message;
pub mod provider;
pub mod request;
pub mod schema;

#[doc(inline)]
pub use approval::{AlwaysApprove, AlwaysDecline, Approver, SharedApprover, approval_fn};
pub use cancel::Cancellation;
#[doc(inline)]
pub use engine::{Engine, EngineConfig, Execution, Messages, TextSegments};
pub use error::ExecutionError;
#[doc(inline)]
pub use function::{Function, FunctionDefinition, Functions, Tool, json};
#[doc(inline)]
pub use message::{
    ChatMessage, FunctionInvocation, FunctionReturnValue, ImageMessage, Message, Role,
};
#[doc(inline)]
pub use provider::{Emitter, Provider};
#[doc(inline)]
pub use request::ChatRequest;
#[doc(inline)]
pub use schema::{Describe, schema_for};

/// Result type used throughout the crate.
///
/// Type alias for [`anyhow::Result<T>`](anyhow::Result) with [`String`] as default success type.
pub type Result<T = String> = anyhow::Result<T>;

pub use anyhow::Error;
