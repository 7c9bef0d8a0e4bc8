use core::future::{Future, IntoFuture};
use core::mem;
use core::pin::{Pin, pin};
use core::task::{Context, Poll};

use async_channel::Receiver;
use futures_core::Stream;
use futures_lite::StreamExt;
use pin_project_lite::pin_project;

use crate::cancel::Cancellation;
use crate::error::ExecutionError;
use crate::message::Message;

/// Handle to a running execution.
///
/// The two output streams are handed out once each and can be consumed independently, on
/// different tasks if needed. Dropping the handle does not stop the execution; call
/// [`cancel`](Self::cancel) or [`dispose`](Self::dispose) for that.
#[derive(Debug)]
pub struct Execution {
    text: Option<TextSegments>,
    messages: Option<Messages>,
    cancellation: Cancellation,
    done: Receiver<()>,
}

impl Execution {
    pub(super) const fn new(
        text: Receiver<Result<String, ExecutionError>>,
        messages: Receiver<Result<Message, ExecutionError>>,
        cancellation: Cancellation,
        done: Receiver<()>,
    ) -> Self {
        Self {
            text: Some(TextSegments { inner: text }),
            messages: Some(Messages { inner: messages }),
            cancellation,
            done,
        }
    }

    /// Takes the text stream. Returns `None` if it was already taken.
    pub fn text_segments(&mut self) -> Option<TextSegments> {
        self.text.take()
    }

    /// Takes the message stream. Returns `None` if it was already taken.
    pub fn messages(&mut self) -> Option<Messages> {
        self.messages.take()
    }

    /// Requests cancellation. Both streams close without an error.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns the cancellation signal of this execution.
    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Returns `true` once the turn loop and every function call it spawned have finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done.is_closed()
    }

    /// Waits until the turn loop and every function call it spawned have finished.
    pub async fn wait(&self) {
        // Nothing is ever sent; `recv` fails once the last background task dropped its sender.
        let _ = self.done.recv().await;
    }

    /// Cancels the execution and waits until no background work is left.
    pub async fn dispose(self) {
        self.cancel();
        self.wait().await;
    }
}

pin_project! {
    /// Raw text fragments in the order the provider produced them, across all turns.
    ///
    /// If the execution fails, the error is the last item. Awaiting the stream directly
    /// collects the whole text.
    #[derive(Debug)]
    pub struct TextSegments {
        #[pin]
        inner: Receiver<Result<String, ExecutionError>>,
    }
}

impl Stream for TextSegments {
    type Item = Result<String, ExecutionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl TextSegments {
    /// Concatenates all fragments.
    ///
    /// # Errors
    ///
    /// Returns the execution's failure, if any.
    pub async fn concat(self) -> Result<String, ExecutionError> {
        self.await
    }
}

pin_project! {
    /// Future returned when awaiting [`TextSegments`].
    #[derive(Debug)]
    pub struct Concat {
        #[pin]
        segments: TextSegments,
        collected: String,
    }
}

impl Future for Concat {
    type Output = Result<String, ExecutionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.segments.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(segment))) => this.collected.push_str(&segment),
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Err(error)),
                Poll::Ready(None) => return Poll::Ready(Ok(mem::take(this.collected))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl IntoFuture for TextSegments {
    type Output = Result<String, ExecutionError>;
    type IntoFuture = Concat;

    fn into_future(self) -> Self::IntoFuture {
        Concat {
            segments: self,
            collected: String::new(),
        }
    }
}

pin_project! {
    /// Every message of the execution in the order it was produced: what the provider sent
    /// and the return values computed for it.
    ///
    /// If the execution fails, the error is the last item.
    #[derive(Debug)]
    pub struct Messages {
        #[pin]
        inner: Receiver<Result<Message, ExecutionError>>,
    }
}

impl Stream for Messages {
    type Item = Result<Message, ExecutionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl Messages {
    /// Collects all messages.
    ///
    /// # Errors
    ///
    /// Returns the execution's failure, if any. Messages received before it are discarded.
    pub async fn collect_all(self) -> Result<Vec<Message>, ExecutionError> {
        let mut stream = pin!(self);
        let mut messages = Vec::new();
        while let Some(message) = stream.next().await {
            messages.push(message?);
        }
        Ok(messages)
    }
}
