//! Message types for conversations with function calling.
//!
//! A conversation is an ordered list of [`Message`]s. The set of variants is closed: plain
//! text turns, image inputs, model-declared function invocations and the return values
//! answering them.
//!
//! Return values must immediately follow the invocation they answer. Some providers reject
//! histories where anything else sits between the two; [`verify_adjacency`] checks the rule.

use core::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Input from the human user.
    User,
    /// Output of the model.
    Assistant,
    /// Context or instructions for the model.
    System,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A text turn.
    Chat(ChatMessage),
    /// An image supplied as input.
    Image(ImageMessage),
    /// The model asking for a function to be called.
    FunctionInvocation(FunctionInvocation),
    /// The answer to a [`FunctionInvocation`].
    FunctionReturnValue(FunctionReturnValue),
}

/// A text turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the text.
    pub role: Role,
    /// The text itself.
    pub text: String,
}

/// An image supplied as input, carried as a base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    /// Who supplied the image.
    pub role: Role,
    /// MIME type of the payload, e.g. `image/png`.
    pub media_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
}

impl ImageMessage {
    /// Creates an image message from an already encoded base64 payload.
    pub fn new(role: Role, media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            role,
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Creates an image message by encoding raw bytes.
    pub fn from_bytes(role: Role, media_type: impl Into<String>, bytes: impl AsRef<[u8]>) -> Self {
        Self::new(role, media_type, STANDARD.encode(bytes))
    }

    /// Decodes the payload back into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid base64.
    pub fn decode(&self) -> crate::Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.data)?)
    }
}

/// A model-declared intent to call a function.
///
/// Nothing has been executed yet when this is observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInvocation {
    /// Identifier, unique within the conversation.
    ///
    /// The matching [`FunctionReturnValue`] carries the same value.
    pub id: String,
    /// Name of the function to call.
    pub name: String,
    /// Arguments as JSON, shaped by the function's schema.
    pub parameters: Value,
}

impl FunctionInvocation {
    /// Creates a new invocation.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters,
        }
    }

    /// Returns the parameters as a JSON string.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        self.parameters.to_string()
    }
}

/// The answer to a [`FunctionInvocation`], fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReturnValue {
    /// Id of the invocation this answers.
    pub invocation_id: String,
    /// Whether the function ran and succeeded.
    pub success: bool,
    /// Output of the function, or a description of why it did not run.
    pub result: String,
}

impl FunctionReturnValue {
    /// Creates a successful return value.
    #[must_use]
    pub fn success(invocation_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            success: true,
            result: result.into(),
        }
    }

    /// Creates an unsuccessful return value.
    #[must_use]
    pub fn failure(invocation_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            success: false,
            result: result.into(),
        }
    }
}

impl Message {
    /// Creates a user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::chat(Role::User, text)
    }

    /// Creates an assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::chat(Role::Assistant, text)
    }

    /// Creates a system text message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::chat(Role::System, text)
    }

    /// Creates a text message with the given role.
    pub fn chat(role: Role, text: impl Into<String>) -> Self {
        Self::Chat(ChatMessage {
            role,
            text: text.into(),
        })
    }

    /// Creates a user image message from raw bytes.
    pub fn image(media_type: impl Into<String>, bytes: impl AsRef<[u8]>) -> Self {
        Self::Image(ImageMessage::from_bytes(Role::User, media_type, bytes))
    }

    /// Creates a function invocation message.
    #[must_use]
    pub fn invocation(id: impl Into<String>, name: impl Into<String>, parameters: Value) -> Self {
        Self::FunctionInvocation(FunctionInvocation::new(id, name, parameters))
    }

    /// Returns the role of the sender.
    ///
    /// Invocations come from the assistant, return values are reported as user input.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Chat(ChatMessage { role, .. }) | Self::Image(ImageMessage { role, .. }) => *role,
            Self::FunctionInvocation(_) => Role::Assistant,
            Self::FunctionReturnValue(_) => Role::User,
        }
    }

    /// Returns the text if this is a chat message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Chat(message) => Some(&message.text),
            _ => None,
        }
    }

    /// Returns the invocation if this is one.
    #[must_use]
    pub const fn as_invocation(&self) -> Option<&FunctionInvocation> {
        match self {
            Self::FunctionInvocation(invocation) => Some(invocation),
            _ => None,
        }
    }

    /// Returns the return value if this is one.
    #[must_use]
    pub const fn as_return_value(&self) -> Option<&FunctionReturnValue> {
        match self {
            Self::FunctionReturnValue(value) => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if this is a function invocation.
    #[must_use]
    pub const fn is_invocation(&self) -> bool {
        matches!(self, Self::FunctionInvocation(_))
    }
}

impl From<ChatMessage> for Message {
    fn from(message: ChatMessage) -> Self {
        Self::Chat(message)
    }
}

impl From<ImageMessage> for Message {
    fn from(message: ImageMessage) -> Self {
        Self::Image(message)
    }
}

impl From<FunctionInvocation> for Message {
    fn from(invocation: FunctionInvocation) -> Self {
        Self::FunctionInvocation(invocation)
    }
}

impl From<FunctionReturnValue> for Message {
    fn from(value: FunctionReturnValue) -> Self {
        Self::FunctionReturnValue(value)
    }
}

/// A return value that does not directly follow its invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyError {
    /// Position of the offending return value.
    pub index: usize,
    /// The invocation id it claims to answer.
    pub invocation_id: String,
}

impl fmt::Display for AdjacencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "return value at position {} does not directly follow invocation '{}'",
            self.index, self.invocation_id
        )
    }
}

impl std::error::Error for AdjacencyError {}

/// Checks that every return value immediately follows the invocation it answers.
///
/// Invocations without a return value are allowed; the caller may answer them later.
///
/// # Errors
///
/// Returns the first return value that breaks the rule.
pub fn verify_adjacency(messages: &[Message]) -> Result<(), AdjacencyError> {
    for (index, message) in messages.iter().enumerate() {
        let Message::FunctionReturnValue(value) = message else {
            continue;
        };
        let answered = index
            .checked_sub(1)
            .and_then(|previous| messages[previous].as_invocation())
            .is_some_and(|invocation| invocation.id == value.invocation_id);
        if !answered {
            return Err(AdjacencyError {
                index,
                invocation_id: value.invocation_id.clone(),
            });
        }
    }
    Ok(())
}
