use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Outcome of one tool invocation.
///
/// Exactly one of `output` / `error` is meaningful, selected by `success`.
/// `duration` is always set; the execution engine stamps it.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

impl std::fmt::Display for ToolResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.success {
            write!(f, "{}", self.output)
        } else {
            write!(f, "{}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// A tool the model can invoke.
///
/// Failures never cross this boundary as errors; every outcome is a
/// [`ToolResult`], so the model can observe what went wrong and react.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the argument map, derived once per tool.
    fn parameters(&self) -> Value;

    /// Sensitive tools require confirmation regardless of target path.
    fn sensitive(&self) -> bool {
        false
    }

    /// Per-tool execution timeout. `None` means no timeout (file ops).
    fn execution_timeout(&self) -> Option<Duration> {
        None
    }

    /// Check a model-emitted argument map against this tool's schema.
    ///
    /// The engine runs this before any policy decision, so malformed calls
    /// fail as `ValidationError` even when they would otherwise be refused,
    /// prompted for, or intercepted by dry-run. Remote tools keep the
    /// default: their server enforces the schema.
    fn validate(&self, _args: &Value) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, args: Value) -> ToolResult;

    /// Model-facing schema in chat-completions function format.
    fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters()
            }
        })
    }
}

/// Deserialize a model-emitted argument map into a tool's typed args struct.
///
/// Arg structs declare `deny_unknown_fields`, so unknown fields are rejected
/// rather than silently dropped. The serde error names the offending field.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("ValidationError: {}", e))
}

/// Non-consuming schema check backing [`Tool::validate`] implementations.
pub fn validate_as<T: DeserializeOwned>(args: &Value) -> Result<(), String> {
    parse_args::<T>(args.clone()).map(|_| ())
}
