use core::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use executor_core::{Executor, Task};
use futures::FutureExt;
use futures_lite::future;

use super::{EngineConfig, TurnEvent};
use crate::approval::SharedApprover;
use crate::cancel::Cancellation;
use crate::error::ExecutionError;
use crate::function::Function;
use crate::message::{FunctionInvocation, FunctionReturnValue, Message};
use crate::provider::{Emitter, Provider};
use crate::request::ChatRequest;

/// Owns the state of one execution and runs its turn loop.
pub(super) struct Driver<P, E> {
    pub(super) provider: Arc<P>,
    pub(super) executor: E,
    pub(super) config: EngineConfig,
    pub(super) cancellation: Cancellation,
    pub(super) text: Sender<Result<String, ExecutionError>>,
    pub(super) messages: Sender<Result<Message, ExecutionError>>,
    // Never sent on. Clones are held by every resolution task, so the receiver only closes
    // once all background work is gone.
    pub(super) done: Sender<()>,
}

enum Step {
    Continue(ChatRequest),
    Completed,
    Cancelled,
}

/// What a single turn left behind.
#[derive(Default)]
struct Turn {
    received: Vec<Message>,
    answers: HashMap<String, FunctionReturnValue>,
    invocations: usize,
    outstanding: usize,
    ended: bool,
    failure: Option<ExecutionError>,
}

impl Turn {
    const fn is_settled(&self) -> bool {
        self.ended && self.outstanding == 0
    }

    // Received messages in arrival order, each invocation directly followed by its answer.
    fn into_history(mut self) -> Vec<Message> {
        let mut history = Vec::with_capacity(self.received.len() + self.answers.len());
        for message in self.received {
            let answer = message
                .as_invocation()
                .and_then(|invocation| self.answers.remove(&invocation.id));
            history.push(message);
            if let Some(answer) = answer {
                history.push(answer.into());
            }
        }
        history
    }
}

impl<P, E> Driver<P, E>
where
    P: Provider,
    E: Executor + Clone + Send + Sync + 'static,
{
    pub(super) async fn run(self, request: ChatRequest) {
        match self.turns(request).await {
            Ok(true) => tracing::info!("execution completed"),
            Ok(false) => tracing::debug!("execution cancelled"),
            Err(error) => {
                tracing::warn!(%error, "execution failed");
                let _ = self.text.try_send(Err(error.clone()));
                let _ = self.messages.try_send(Err(error));
            }
        }
        // Dropping `self` closes both output streams.
    }

    // Returns `Ok(true)` on completion and `Ok(false)` on cancellation.
    async fn turns(&self, mut request: ChatRequest) -> Result<bool, ExecutionError> {
        let mut turn = 0;
        loop {
            if self.cancellation.is_cancelled() {
                return Ok(false);
            }
            if let Some(limit) = self.config.max_turns {
                if turn >= limit {
                    return Err(ExecutionError::TurnLimit { limit });
                }
            }
            turn += 1;

            match self.turn(&request, turn).await? {
                Step::Continue(next) => request = next,
                Step::Completed => return Ok(true),
                Step::Cancelled => return Ok(false),
            }
        }
    }

    async fn turn(&self, request: &ChatRequest, turn: usize) -> Result<Step, ExecutionError> {
        tracing::debug!(turn, messages = request.messages().len(), "turn started");

        // Cancelling the scope stops this turn's provider call and resolutions only.
        let scope = self.cancellation.child();
        let (events_tx, events_rx) = async_channel::unbounded();
        let emitter = Emitter::new(self.text.clone(), events_tx.clone());

        let stream = async {
            let result = future::or(
                async { Some(self.provider.stream(request, &emitter, &scope).await) },
                async {
                    scope.cancelled().await;
                    None
                },
            )
            .await;
            let _ = events_tx.try_send(TurnEvent::StreamEnded(result));
        };
        let collect = self.collect(request, turn, &scope, &events_tx, &events_rx);

        let ((), state) = future::zip(stream, collect).await;
        drop(emitter);

        // Once the execution is cancelled, a provider failing on the aborted request still
        // closes the streams silently.
        if self.cancellation.is_cancelled() {
            tracing::debug!(turn, "turn cancelled");
            return Ok(Step::Cancelled);
        }
        if let Some(failure) = state.failure {
            return Err(failure);
        }
        if scope.is_cancelled() {
            tracing::debug!(turn, "turn cancelled");
            return Ok(Step::Cancelled);
        }

        tracing::debug!(
            turn,
            received = state.received.len(),
            invocations = state.invocations,
            answered = state.answers.len(),
            "turn finished"
        );
        if state.invocations == 0 {
            return Ok(Step::Completed);
        }
        Ok(Step::Continue(request.extended(state.into_history())))
    }

    async fn collect(
        &self,
        request: &ChatRequest,
        turn: usize,
        scope: &Cancellation,
        events_tx: &Sender<TurnEvent>,
        events_rx: &Receiver<TurnEvent>,
    ) -> Turn {
        let mut state = Turn::default();
        while !state.is_settled() {
            let event = future::or(async { events_rx.recv().await.ok() }, async {
                scope.cancelled().await;
                None
            })
            .await;
            let Some(event) = event else {
                break;
            };

            match event {
                TurnEvent::Received(message) => {
                    let _ = self.messages.try_send(Ok(message.clone()));
                    if let Message::FunctionInvocation(invocation) = &message {
                        state.invocations += 1;
                        match self.dispatch(request, invocation, turn, scope, events_tx) {
                            Ok(true) => state.outstanding += 1,
                            Ok(false) => {}
                            Err(error) => {
                                state.failure = Some(error);
                                scope.cancel();
                                break;
                            }
                        }
                    }
                    state.received.push(message);
                }
                TurnEvent::Resolved(answer) => {
                    state.outstanding -= 1;
                    if let Some(answer) = answer {
                        let _ = self.messages.try_send(Ok(answer.clone().into()));
                        state.answers.insert(answer.invocation_id.clone(), answer);
                    }
                }
                TurnEvent::StreamEnded(result) => {
                    state.ended = true;
                    if let Some(Err(error)) = result {
                        state.failure = Some(error.into());
                        scope.cancel();
                        break;
                    }
                }
            }
        }
        state
    }

    // Spawns the resolution of one invocation. Returns `false` if the engine does not answer it.
    fn dispatch(
        &self,
        request: &ChatRequest,
        invocation: &FunctionInvocation,
        turn: usize,
        scope: &Cancellation,
        events: &Sender<TurnEvent>,
    ) -> Result<bool, ExecutionError> {
        let Some(function) = request
            .function(&invocation.name)
            .filter(|function| function.is_implemented())
        else {
            tracing::debug!(
                turn,
                function = %invocation.name,
                invocation_id = %invocation.id,
                "no implementation, leaving the invocation to the caller"
            );
            return Ok(false);
        };

        let approver = if function.requires_approval() {
            let Some(approver) = request.approver() else {
                return Err(ExecutionError::ApprovalUnavailable {
                    function: function.name().to_owned(),
                });
            };
            Some(approver.clone())
        } else {
            None
        };

        tracing::debug!(
            turn,
            function = %invocation.name,
            invocation_id = %invocation.id,
            "resolving invocation"
        );
        let resolution = resolve(
            invocation.clone(),
            function.clone(),
            approver,
            self.config.decline_message.clone(),
        );
        let scope = scope.clone();
        let events = events.clone();
        let done = self.done.clone();
        self.executor
            .spawn(async move {
                let answer = future::or(async { Some(resolution.await) }, async {
                    scope.cancelled().await;
                    None
                })
                .await;
                if let Some(answer) = answer {
                    let _ = events.try_send(TurnEvent::Resolved(answer));
                }
                drop(done);
            })
            .detach();
        Ok(true)
    }
}

async fn resolve(
    invocation: FunctionInvocation,
    function: Function,
    approver: Option<SharedApprover>,
    decline_message: Cow<'static, str>,
) -> Option<FunctionReturnValue> {
    let id = invocation.id.clone();

    if let Some(approver) = approver {
        let approval = AssertUnwindSafe(approver.approve(&invocation, &function))
            .catch_unwind()
            .await;
        match approval {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                tracing::debug!(function = %invocation.name, invocation_id = %id, "call declined");
                return Some(FunctionReturnValue::failure(id, decline_message));
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    function = %invocation.name,
                    invocation_id = %id,
                    %error,
                    "approval failed"
                );
                return Some(FunctionReturnValue::failure(id, format!("{error:#}")));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(
                    function = %invocation.name,
                    invocation_id = %id,
                    %message,
                    "approval panicked"
                );
                return Some(FunctionReturnValue::failure(id, message));
            }
        }
    }

    let call = function.invoke(invocation.parameters)?;
    let answer = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(result)) => FunctionReturnValue::success(id, result),
        Ok(Err(error)) => {
            tracing::warn!(
                function = %invocation.name,
                invocation_id = %id,
                %error,
                "function failed"
            );
            FunctionReturnValue::failure(id, format!("{error:#}"))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(
                function = %invocation.name,
                invocation_id = %id,
                %message,
                "function panicked"
            );
            FunctionReturnValue::failure(id, message)
        }
    };
    Some(answer)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "function panicked".to_owned())
}
