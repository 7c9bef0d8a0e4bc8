//! # chatloop-derive
//!
//! Procedural macros for chatloop.
//!
//! - `#[derive(Describe)]` describes a struct or a unit-only enum to the JSON Schema generator.
//! - `#[function(...)]` turns an async function into a unit struct implementing `Tool`.
//!
//! ## Quick Start
//!
//! ```rust
//! use chatloop::{Describe, Result, function};
//!
//! #[derive(Describe, serde::Deserialize)]
//! #[serde(rename_all = "lowercase")]
//! enum Unit { Celsius, Fahrenheit }
//!
//! /// Current weather for a city.
//! #[function]
//! pub async fn get_weather(
//!     #[describe(description = "City name, e.g. Amsterdam")] location: String,
//!     unit: Option<Unit>,
//! ) -> Result<String> {
//!     Ok(format!("20 degrees in {location}"))
//! }
//! ```
//!
//! ## Requirements
//!
//! - `Describe` works on structs with named fields and on enums whose variants carry no data
//! - Functions must be `async` and free (no `self`, no generics)
//! - Parameters must implement `serde::Deserialize` and `Describe`
//! - The return type must be `Result<T>` where `T: serde::Serialize`

mod attr;
mod describe;
mod function;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemFn, parse_macro_input};

/// Derives `Describe` so the type can appear in function arguments.
///
/// Structs become objects; every field is required unless its type is an `Option` or it carries
/// `#[serde(default)]`. Unit-only enums become strings restricted to the variant names.
///
/// Descriptions come from doc comments or `#[describe(description = "...")]`. Names follow
/// `#[describe(rename = "...")]`, `#[describe(rename_all = "...")]` and the matching serde
/// attributes, so the schema always matches what serde accepts. `#[describe(skip)]` and
/// `#[serde(skip)]` leave a field out.
#[proc_macro_derive(Describe, attributes(describe, serde))]
pub fn derive_describe(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    describe::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Converts an async function into a `Tool`.
///
/// # Arguments
///
/// - `description = "..."`: what the function does. Defaults to the doc comment; one of the two
///   is required.
/// - `rename = "..."`: name shown to the model. Defaults to the function name.
/// - `approval`: every call must be approved first.
///
/// # Generated Code
///
/// For a function named `get_weather`, the macro keeps the function and generates:
///
/// 1. A `GetWeatherArgs` struct with one field per parameter, deserializable and described
///    with every parameter required
/// 2. A `GetWeather` unit struct implementing `Tool`, ready for `ChatRequest::with_tool`
///
/// Parameter names are normalized to `snake_case` in the schema. Describe a parameter with
/// `#[describe(description = "...")]`.
#[proc_macro_attribute]
pub fn function(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as function::FunctionArgs);
    let input = parse_macro_input!(input as ItemFn);
    function::expand(args, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
