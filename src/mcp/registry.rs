//! Tool catalog
//!
//! Tool providers register their operations through a [`ToolRegistrar`]; the
//! registry runs every provider once, on first use, and serves the resulting
//! catalog for discovery and invocation by name. The catalog never changes
//! after that first initialization.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, OnceLock},
};

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::dispatch::panic_message;
use crate::mcp::schema::{generate_schema, ToolArguments};

pub type ToolHandler = Arc<dyn Fn(&str) -> Result<Value, ToolError> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
    #[error("Tool panicked: {0}")]
    Panicked(String),
}

#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    handler: ToolHandler,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Wire shape of one `tools/list` entry. `input_schema` keeps property
/// declaration order, which the SDK `Tool` type (a `HashMap`) does not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A unit that owns state and exposes operations on it as tools.
pub trait ToolProvider: Send + Sync {
    fn register_tools(self: Arc<Self>, registrar: &mut ToolRegistrar);
}

#[derive(Default)]
pub struct ToolRegistrar {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolRegistrar {
    /// Registers a tool whose schema is derived from `A`.
    pub fn tool<A, F>(&mut self, name: &str, description: &str, handler: F)
    where
        A: ToolArguments,
        F: Fn(&str) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        let schema = generate_schema(Some(&A::fields()));
        self.insert(name, description, schema, Arc::new(handler));
    }

    /// Registers a tool that takes no arguments.
    pub fn stateless<F>(&mut self, name: &str, description: &str, handler: F)
    where
        F: Fn() -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.insert(
            name,
            description,
            generate_schema(None),
            Arc::new(move |_arguments: &str| handler()),
        );
    }

    fn insert(&mut self, name: &str, description: &str, input_schema: Value, handler: ToolHandler) {
        let descriptor = ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            handler,
        };
        if self.tools.insert(name.to_string(), descriptor).is_some() {
            warn!(tool = %name, "duplicate tool registration, keeping the last one");
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    providers: Vec<Arc<dyn ToolProvider>>,
    catalog: OnceLock<IndexMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Runs all providers and freezes the catalog. Later calls are no-ops.
    pub fn initialize(&self) -> &IndexMap<String, ToolDescriptor> {
        self.catalog.get_or_init(|| {
            let mut registrar = ToolRegistrar::default();
            for provider in &self.providers {
                Arc::clone(provider).register_tools(&mut registrar);
            }
            info!(tools = registrar.tools.len(), "tool registry initialized");
            registrar.tools
        })
    }

    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.initialize()
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.initialize().get(name)
    }

    /// Invokes a tool with its raw arguments JSON. A `null` result becomes
    /// `{"success":true}`.
    pub fn execute(&self, name: &str, arguments: &str) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let result = catch_unwind(AssertUnwindSafe(|| (tool.handler)(arguments)))
            .map_err(|payload| ToolError::Panicked(panic_message(payload.as_ref())))??;

        Ok(match result {
            Value::Null => json!({ "success": true }),
            value => value,
        })
    }
}

/// Deserializes tool arguments; an empty string reads as `{}`.
pub fn parse_arguments<T: DeserializeOwned>(arguments: &str) -> Result<T, ToolError> {
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(arguments).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::mcp::schema::{FieldKind, FieldSchema};

    #[derive(Deserialize)]
    struct GreetArgs {
        who: String,
    }

    impl ToolArguments for GreetArgs {
        fn fields() -> Vec<FieldSchema> {
            vec![FieldSchema::new("who", FieldKind::String).required()]
        }
    }

    #[derive(Default)]
    struct Greeter {
        calls: AtomicUsize,
        registrations: AtomicUsize,
    }

    impl Greeter {
        fn greet(&self, arguments: &str) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let args: GreetArgs = parse_arguments(arguments)?;
            Ok(json!({ "greeting": format!("hello {}", args.who) }))
        }
    }

    impl ToolProvider for Greeter {
        fn register_tools(self: Arc<Self>, registrar: &mut ToolRegistrar) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            let greeter = Arc::clone(&self);
            registrar.tool::<GreetArgs, _>("greet", "Say hello", move |arguments| {
                greeter.greet(arguments)
            });
            registrar.stateless("noop", "Does nothing", || Ok(Value::Null));
            registrar.stateless("explode", "Always fails", || {
                Err(ToolError::Failed("engine stalled".to_string()))
            });
            registrar.stateless("panics", "Panics", || panic!("bad state"));
        }
    }

    struct Shadowing;

    impl ToolProvider for Shadowing {
        fn register_tools(self: Arc<Self>, registrar: &mut ToolRegistrar) {
            registrar.stateless("noop", "Replacement noop", || Ok(json!("second")));
        }
    }

    fn registry(greeter: Arc<Greeter>) -> ToolRegistry {
        ToolRegistry::new().with_provider(greeter)
    }

    #[test]
    fn empty_registry_lists_nothing() {
        assert!(ToolRegistry::new().list_definitions().is_empty());
    }

    #[test]
    fn initializes_once() {
        let greeter = Arc::new(Greeter::default());
        let registry = registry(Arc::clone(&greeter));

        let first = registry.list_definitions();
        let second = registry.list_definitions();
        registry.initialize();

        assert_eq!(first, second);
        assert_eq!(greeter.registrations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lists_schema_per_tool() {
        let registry = registry(Arc::new(Greeter::default()));
        let definitions = registry.list_definitions();

        let greet = definitions
            .iter()
            .find(|tool| tool.name == "greet")
            .expect("greet tool");
        assert_eq!(greet.input_schema["required"], json!(["who"]));

        let json = serde_json::to_value(greet).expect("serialize");
        assert!(json.get("inputSchema").is_some());
    }

    #[test]
    fn executes_bound_tool_with_raw_arguments() {
        let greeter = Arc::new(Greeter::default());
        let registry = registry(Arc::clone(&greeter));

        let result = registry
            .execute("greet", r#"{"who":"world"}"#)
            .expect("greet result");

        assert_eq!(result, json!({"greeting": "hello world"}));
        assert_eq!(greeter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_result_is_normalized() {
        let registry = registry(Arc::new(Greeter::default()));
        assert_eq!(
            registry.execute("noop", "{}"),
            Ok(json!({"success": true}))
        );
    }

    #[test]
    fn unknown_tool_fails() {
        let registry = registry(Arc::new(Greeter::default()));
        assert_eq!(
            registry.execute("no_such_tool", "{}"),
            Err(ToolError::UnknownTool("no_such_tool".to_string()))
        );
    }

    #[test]
    fn tool_failures_surface_unchanged() {
        let registry = registry(Arc::new(Greeter::default()));

        assert_eq!(
            registry.execute("explode", "{}"),
            Err(ToolError::Failed("engine stalled".to_string()))
        );
        assert_eq!(
            registry.execute("panics", "{}"),
            Err(ToolError::Panicked("bad state".to_string()))
        );
        assert!(matches!(
            registry.execute("greet", r#"{"who":3}"#),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn last_registration_wins() {
        let registry = registry(Arc::new(Greeter::default())).with_provider(Arc::new(Shadowing));

        let noop = registry.get("noop").expect("noop tool");
        assert_eq!(noop.description, "Replacement noop");
        assert_eq!(registry.execute("noop", ""), Ok(json!("second")));
    }
}
