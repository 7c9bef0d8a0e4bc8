//! # Execution engine
//!
//! The [`Engine`] drives a conversation with a [`Provider`] turn by turn:
//!
//! 1. The provider streams the reply to the current request. Text fragments go straight to
//!    the text stream, complete messages to the message stream.
//! 2. Every [`FunctionInvocation`](crate::FunctionInvocation) is resolved on its own task while
//!    the reply keeps streaming. Approval is asked first when the function requires it.
//! 3. When the reply is complete and every resolution finished, a turn without invocations
//!    completes the execution. Otherwise the received messages, each invocation directly
//!    followed by its return value, are appended to the request and the next turn starts.
//!
//! Failures of functions and approval handlers become unsuccessful return values the model
//! can react to. Provider failures and missing approval handlers end the execution with an
//! [`ExecutionError`](crate::ExecutionError), delivered as the last item of both streams.
//! Cancellation ends it silently.
//!
//! ```rust,ignore
//! let engine = Engine::new(provider, TokioGlobal);
//! let mut execution = engine.execute(request);
//! let messages = execution.messages().unwrap();
//! let text = execution.text_segments().unwrap().await?;
//! ```

mod driver;
mod execution;

use std::borrow::Cow;
use std::sync::Arc;

use executor_core::{Executor, Task};

use crate::cancel::Cancellation;
use crate::message::{FunctionReturnValue, Message};
use crate::provider::Provider;
use crate::request::ChatRequest;

pub use execution::{Concat, Execution, Messages, TextSegments};

/// Result text of a call the approval handler declined.
pub const DECLINED_MESSAGE: &str = "The user declined to run this function.";

/// Configuration for engine behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of turns per execution. `None` means unlimited.
    pub max_turns: Option<usize>,

    /// Result text reported to the model when a call is declined.
    pub decline_message: Cow<'static, str>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            decline_message: Cow::Borrowed(DECLINED_MESSAGE),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of turns.
    #[must_use]
    pub const fn with_max_turns(mut self, limit: usize) -> Self {
        self.max_turns = Some(limit);
        self
    }

    /// Sets the result text of declined calls.
    #[must_use]
    pub fn with_decline_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.decline_message = message.into();
        self
    }
}

/// Runs chat requests against a provider.
///
/// Background work is spawned on `E`. The engine is cheap to clone and can run any number of
/// executions concurrently.
#[derive(Debug)]
pub struct Engine<P, E> {
    provider: Arc<P>,
    executor: E,
    config: EngineConfig,
}

impl<P, E: Clone> Clone for Engine<P, E> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P, E> Engine<P, E>
where
    P: Provider,
    E: Executor + Clone + Send + Sync + 'static,
{
    /// Creates an engine with the default configuration.
    pub fn new(provider: P, executor: E) -> Self {
        Self {
            provider: Arc::new(provider),
            executor,
            config: EngineConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Starts executing `request`.
    ///
    /// The first turn starts right away on the executor, whether or not the streams are read.
    #[must_use = "dropping the execution does not stop it"]
    pub fn execute(&self, request: ChatRequest) -> Execution {
        self.execute_with(request, Cancellation::new())
    }

    /// Starts executing `request`, stopping when `cancellation` fires.
    #[must_use = "dropping the execution does not stop it"]
    pub fn execute_with(&self, request: ChatRequest, cancellation: Cancellation) -> Execution {
        let (text_tx, text_rx) = async_channel::unbounded();
        let (message_tx, message_rx) = async_channel::unbounded();
        let (done_tx, done_rx) = async_channel::bounded(1);

        let driver = driver::Driver {
            provider: self.provider.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
            cancellation: cancellation.clone(),
            text: text_tx,
            messages: message_tx,
            done: done_tx,
        };
        self.executor.spawn(driver.run(request)).detach();

        Execution::new(text_rx, message_rx, cancellation, done_rx)
    }
}

/// What the collector of a turn hears about.
#[derive(Debug)]
pub(crate) enum TurnEvent {
    /// The provider emitted a message.
    Received(Message),
    /// A resolution finished. `None` when the function turned out to have no implementation.
    Resolved(Option<FunctionReturnValue>),
    /// The provider returned. `None` if it was cut short by cancellation.
    StreamEnded(Option<crate::Result<()>>),
}
