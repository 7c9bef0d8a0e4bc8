//! Chat requests.

use crate::approval::{Approver, SharedApprover};
use crate::function::{Function, Functions, Tool};
use crate::message::Message;

/// Everything a provider needs for one turn: the conversation so far, the functions the model
/// may call and, optionally, who approves sensitive calls.
///
/// Requests are built once and never mutated by the engine; every turn works on an
/// [`extended`](Self::extended) copy.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    system_prompt: Option<String>,
    messages: Vec<Message>,
    functions: Functions,
    approver: Option<SharedApprover>,
}

impl ChatRequest {
    /// Creates a request from a conversation.
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Appends a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<Message>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Appends messages.
    #[must_use]
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Adds a function, replacing one with the same name.
    #[must_use]
    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.insert(function);
        self
    }

    /// Adds functions, later ones replacing earlier ones with the same name.
    #[must_use]
    pub fn with_functions(mut self, functions: impl IntoIterator<Item = Function>) -> Self {
        self.functions.extend(functions);
        self
    }

    /// Adds a [`Tool`] as an implemented function.
    #[must_use]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.functions.register(tool);
        self
    }

    /// Sets the approval handler.
    #[must_use]
    pub fn with_approver(mut self, approver: impl Approver) -> Self {
        self.approver = Some(SharedApprover::new(approver));
        self
    }

    /// Returns the system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Returns the conversation.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the functions the model may call.
    #[must_use]
    pub const fn functions(&self) -> &Functions {
        &self.functions
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Returns the approval handler.
    #[must_use]
    pub const fn approver(&self) -> Option<&SharedApprover> {
        self.approver.as_ref()
    }

    /// Returns a copy with more messages appended. `self` is left untouched.
    #[must_use]
    pub fn extended(&self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.clone().with_messages(messages)
    }
}
