//! # Function calling
//!
//! Models call functions by name with JSON arguments. A [`Function`] describes one such
//! function: its name, a description for the model, a JSON Schema for the arguments, whether a
//! human must approve each call, and optionally a native implementation.
//!
//! Functions without an implementation are still advertised to the model. Their invocations
//! are passed through to the caller, who answers them in a later request.
//!
//! ## Core Components
//!
//! - [`Tool`] - Trait for typed functions with derived argument schemas
//! - [`Function`] - Type-erased descriptor stored in requests
//! - [`Functions`] - Registry keyed by function name
//! - [`FunctionDefinition`] - Name, description and schema for provider adapters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatloop::{Describe, Tool};
//! use serde::Deserialize;
//!
//! #[derive(Describe, Deserialize)]
//! struct WeatherArgs {
//!     /// City name, e.g. "Amsterdam"
//!     location: String,
//! }
//!
//! struct Weather;
//!
//! impl Tool for Weather {
//!     fn name(&self) -> Cow<'static, str> { "get_weather".into() }
//!     fn description(&self) -> Cow<'static, str> { "Current weather for a city".into() }
//!     type Arguments = WeatherArgs;
//!
//!     async fn call(&self, args: WeatherArgs) -> chatloop::Result {
//!         Ok(format!("20 degrees in {}", args.location))
//!     }
//! }
//! ```

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::borrow::Cow;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::schema::{Describe, schema_for_arguments};

/// Typed functions that can be called by language models.
pub trait Tool: Send + Sync + 'static {
    /// Function name. Must be unique within a request.
    fn name(&self) -> Cow<'static, str>;
    /// Description for the language model.
    fn description(&self) -> Cow<'static, str>;

    /// Whether every call must be approved first. Defaults to `false`.
    fn requires_approval(&self) -> bool {
        false
    }

    /// Arguments type. The argument schema is derived from its [`Describe`] impl.
    type Arguments: Describe + DeserializeOwned;

    /// Executes the function.
    fn call(&self, arguments: Self::Arguments) -> impl Future<Output = Result> + Send;
}

/// Serializes a tool output to a string.
///
/// Strings are returned as-is, everything else as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result {
    let value = serde_json::to_value(value)?;
    Ok(value
        .as_str()
        .map_or_else(|| format!("{value:#}"), ToString::to_string))
}

type BoxFuture = Pin<Box<dyn Future<Output = Result> + Send + 'static>>;

trait Implementation: Send + Sync {
    fn call(&self, arguments: Value) -> BoxFuture;
}

struct FnImplementation<F>(F);

impl<F, Fut> Implementation for FnImplementation<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result> + Send + 'static,
{
    fn call(&self, arguments: Value) -> BoxFuture {
        Box::pin((self.0)(arguments))
    }
}

struct ToolImplementation<T>(Arc<T>);

impl<T: Tool> Implementation for ToolImplementation<T> {
    fn call(&self, arguments: Value) -> BoxFuture {
        let tool = self.0.clone();
        Box::pin(async move {
            let arguments: T::Arguments = serde_json::from_value(arguments)?;
            tool.call(arguments).await
        })
    }
}

/// A function the model may call.
#[derive(Clone)]
pub struct Function {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    schema: Value,
    requires_approval: bool,
    implementation: Option<Arc<dyn Implementation>>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("requires_approval", &self.requires_approval)
            .field("implemented", &self.implementation.is_some())
            .finish_non_exhaustive()
    }
}

impl Function {
    /// Declares a function without an implementation.
    ///
    /// Invocations of it are passed through to the caller unanswered.
    pub fn declare(
        name: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            requires_approval: false,
            implementation: None,
        }
    }

    /// Attaches a native implementation, replacing any previous one.
    #[must_use]
    pub fn with_implementation<F, Fut>(mut self, implementation: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result> + Send + 'static,
    {
        self.implementation = Some(Arc::new(FnImplementation(implementation)));
        self
    }

    /// Requires approval before every call.
    #[must_use]
    pub const fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Creates an implemented function from a [`Tool`].
    pub fn from_tool<T: Tool>(tool: T) -> Self {
        Self {
            name: tool.name(),
            description: tool.description(),
            schema: schema_for_arguments::<T::Arguments>(),
            requires_approval: tool.requires_approval(),
            implementation: Some(Arc::new(ToolImplementation(Arc::new(tool)))),
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the JSON Schema of the arguments.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns `true` if calls must be approved first.
    #[must_use]
    pub const fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    /// Returns `true` if the function carries a native implementation.
    #[must_use]
    pub const fn is_implemented(&self) -> bool {
        self.implementation.is_some()
    }

    /// Runs the native implementation.
    ///
    /// Returns `None` if there is none. The future owns everything it needs and can be
    /// spawned.
    #[must_use]
    pub fn invoke(
        &self,
        arguments: Value,
    ) -> Option<Pin<Box<dyn Future<Output = Result> + Send + 'static>>> {
        self.implementation
            .as_ref()
            .map(|implementation| implementation.call(arguments))
    }

    /// Returns the definition sent to the model.
    #[must_use]
    pub fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: self.schema.clone(),
        }
    }
}

impl<T: Tool> From<T> for Function {
    fn from(tool: T) -> Self {
        Self::from_tool(tool)
    }
}

/// Function definition for provider adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// Description for the model.
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: Value,
}

/// Function registry keyed by name.
///
/// Registering a function under an existing name replaces it. Iteration follows registration
/// order.
#[derive(Clone, Default)]
pub struct Functions {
    functions: IndexMap<String, Function>,
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Functions")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Functions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`Tool`]. Replaces an existing function with the same name.
    pub fn register<T: Tool>(&mut self, tool: T) {
        self.insert(Function::from_tool(tool));
    }

    /// Inserts a function, returning the one it replaced.
    pub fn insert(&mut self, function: Function) -> Option<Function> {
        self.functions.insert(function.name().to_string(), function)
    }

    /// Removes a function.
    pub fn remove(&mut self, name: &str) -> Option<Function> {
        self.functions.shift_remove(name)
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Returns definitions of all functions in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.functions.values().map(Function::definition).collect()
    }

    /// Returns the number of functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if no function is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Iterates over the functions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Calls a function by name with JSON arguments, skipping approval.
    ///
    /// # Errors
    ///
    /// Returns an error if the function is unknown or not implemented, if the arguments do not
    /// match, or if the function itself fails.
    pub async fn call(&self, name: &str, arguments: Value) -> Result {
        let function = self
            .get(name)
            .ok_or_else(|| anyhow::Error::msg(format!("Function '{name}' not found")))?;
        let Some(call) = function.invoke(arguments) else {
            return Err(anyhow::Error::msg(format!(
                "Function '{name}' has no implementation"
            )));
        };
        call.await
    }
}

impl Extend<Function> for Functions {
    fn extend<I: IntoIterator<Item = Function>>(&mut self, iter: I) {
        for function in iter {
            self.insert(function);
        }
    }
}

impl FromIterator<Function> for Functions {
    fn from_iter<I: IntoIterator<Item = Function>>(iter: I) -> Self {
        let mut functions = Self::new();
        functions.extend(iter);
        functions
    }
}
