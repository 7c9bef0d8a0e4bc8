//! The contract provider adapters implement.
//!
//! An adapter translates one vendor's streaming API into two kinds of emissions: raw text
//! fragments as they arrive, and complete [`Message`]s (chat turns, function invocations)
//! once they are fully received. Wire formats, authentication and retries are the adapter's
//! business; the engine only sees the emissions.

use core::future::Future;

use async_channel::Sender;

use crate::cancel::Cancellation;
use crate::engine::TurnEvent;
use crate::error::ExecutionError;
use crate::message::Message;
use crate::request::ChatRequest;

/// A language model behind a streaming API.
pub trait Provider: Send + Sync + 'static {
    /// Streams the reply to `request`.
    ///
    /// Call [`Emitter::text`] and [`Emitter::message`] in the order fragments and messages
    /// actually arrive, and return once the reply is complete. Stop early when `cancellation`
    /// fires. Whatever is returned after the execution was cancelled, `Ok(())` or an error
    /// from the aborted request, is ignored and both streams close without an error.
    ///
    /// # Errors
    ///
    /// Any error ends the execution and is reported to both output streams.
    fn stream(
        &self,
        request: &ChatRequest,
        emitter: &Emitter,
        cancellation: &Cancellation,
    ) -> impl Future<Output = crate::Result<()>> + Send;
}

/// Emission callbacks handed to a [`Provider`] for one turn.
///
/// Emitting never blocks. Emissions after the execution ended are dropped.
#[derive(Debug)]
pub struct Emitter {
    text: Sender<Result<String, ExecutionError>>,
    events: Sender<TurnEvent>,
}

impl Emitter {
    pub(crate) const fn new(
        text: Sender<Result<String, ExecutionError>>,
        events: Sender<TurnEvent>,
    ) -> Self {
        Self { text, events }
    }

    /// Emits a raw text fragment, forwarded verbatim to the text stream.
    pub fn text(&self, fragment: impl Into<String>) {
        let _ = self.text.try_send(Ok(fragment.into()));
    }

    /// Emits a complete message.
    ///
    /// Function invocations are resolved while the stream continues.
    pub fn message(&self, message: impl Into<Message>) {
        let _ = self.events.try_send(TurnEvent::Received(message.into()));
    }
}
