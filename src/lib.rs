//! # chatloop
//!
//! Facade crate that re-exports everything from [`chatloop_core`] plus the `Describe` derive
//! and the `#[function]` attribute. Pull this crate into your application to stream multi-turn
//! conversations with any provider that implements [`Provider`], while functions the model
//! calls are resolved for you.
//!
//! ## What's inside?
//!
//! - [`Engine`] + [`Execution`] for streaming text and messages with automatic function calling.
//! - [`ChatRequest`], [`Message`] and [`Function`] to describe a conversation.
//! - [`schema_for`] and `#[derive(Describe)]` for deterministic JSON Schemas.
//! - `#[function]` to turn async functions into [`Tool`]s.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatloop::{ChatRequest, Engine, Message, Result, function};
//! use executor_core::tokio::TokioGlobal;
//!
//! /// Current weather for a city.
//! #[function]
//! async fn get_weather(location: String) -> Result<String> {
//!     Ok(format!("20 degrees in {location}"))
//! }
//!
//! async fn demo(provider: impl chatloop::Provider) -> Result<String> {
//!     let request = ChatRequest::new([Message::user("How warm is it in Amsterdam?")])
//!         .with_tool(GetWeather);
//!     let mut execution = Engine::new(provider, TokioGlobal).execute(request);
//!     Ok(execution.text_segments().unwrap().await?)
//! }
//! ```

pub use chatloop_core::*;
#[cfg(feature = "derive")]
pub use chatloop_derive::{Describe, function};

#[doc(hidden)]
/// For internal use only.
pub mod __hidden {
    pub use serde;
    pub type CowStr = std::borrow::Cow<'static, str>;
}
