//! Runtime domain
//!
//! Script evaluation plus console and exception events.

use super::standing_view;
use crate::cdp::client::{Domain, SessionHandle};
use crate::cdp::hub::EventView;
use crate::cdp::types::{Command, Event};
use crate::{Error, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// `Runtime.enable`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Enable;

impl Command for Enable {
    const METHOD: &'static str = "Runtime.enable";
    type Response = Value;
}

/// `Runtime.evaluate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    /// JavaScript expression to evaluate
    pub expression: String,
    /// Whether to await promise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
    /// Whether to return as value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    /// Execution context ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<i64>,
}

impl Command for Evaluate {
    const METHOD: &'static str = "Runtime.evaluate";
    type Response = EvaluateResponse;
}

/// Mirror of a JavaScript value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Object type
    #[serde(default)]
    pub r#type: String,
    /// Object subtype
    #[serde(default)]
    pub subtype: Option<String>,
    /// Object value
    #[serde(default)]
    pub value: Option<Value>,
    /// Object description
    #[serde(default)]
    pub description: Option<String>,
    /// Unserializable value
    #[serde(default)]
    pub unserializable_value: Option<String>,
}

/// Details of a thrown exception
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception ID
    pub exception_id: i64,
    /// Exception text
    pub text: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    /// Thrown value
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Best human-readable message for the exception
    pub fn message(&self) -> &str {
        self.exception
            .as_ref()
            .and_then(|e| e.description.as_deref())
            .unwrap_or(&self.text)
    }
}

/// Result of `Runtime.evaluate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    /// Evaluation result
    #[serde(default)]
    pub result: RemoteObject,
    /// Exception details if evaluation failed
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// JavaScript evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    /// String value
    String(String),
    /// Number value
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Null or undefined
    Null,
    /// Object/Array (as JSON)
    Object(Value),
}

impl From<&RemoteObject> for EvaluationResult {
    fn from(obj: &RemoteObject) -> Self {
        match obj.r#type.as_str() {
            "string" => EvaluationResult::String(
                obj.value
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            "number" => EvaluationResult::Number(
                obj.value.as_ref().and_then(Value::as_f64).unwrap_or(0.0),
            ),
            "boolean" => {
                EvaluationResult::Bool(obj.value.as_ref().and_then(Value::as_bool).unwrap_or(false))
            }
            "object" | "function" | "bigint" | "symbol" => match &obj.value {
                Some(Value::Null) | None if obj.subtype.as_deref() == Some("null") => EvaluationResult::Null,
                value => EvaluationResult::Object(value.clone().unwrap_or(Value::Null)),
            },
            other => {
                if other != "undefined" {
                    debug!("Unknown remote object type '{}', treating as null", other);
                }
                EvaluationResult::Null
            }
        }
    }
}

/// `Runtime.consoleAPICalled`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
    /// Call type (`log`, `error`, ...)
    pub r#type: String,
    /// Call arguments
    #[serde(default)]
    pub args: Vec<RemoteObject>,
    #[serde(default)]
    pub execution_context_id: i64,
    #[serde(default)]
    pub timestamp: f64,
}

impl Event for ConsoleApiCalled {
    const METHOD: &'static str = "Runtime.consoleAPICalled";
}

/// `Runtime.exceptionThrown`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrown {
    #[serde(default)]
    pub timestamp: f64,
    pub exception_details: ExceptionDetails,
}

impl Event for ExceptionThrown {
    const METHOD: &'static str = "Runtime.exceptionThrown";
}

/// Runtime domain wrapper
#[derive(Debug)]
pub struct Runtime {
    session: SessionHandle,
    console_api_called: OnceLock<EventView<ConsoleApiCalled>>,
    exception_thrown: OnceLock<EventView<ExceptionThrown>>,
}

impl Domain for Runtime {
    fn attach(session: SessionHandle) -> Self {
        Self {
            session,
            console_api_called: OnceLock::new(),
            exception_thrown: OnceLock::new(),
        }
    }
}

impl Runtime {
    /// Enable runtime notifications
    pub async fn enable(&self) -> Result<()> {
        self.session.execute(&Enable).await?;
        Ok(())
    }

    /// Evaluate `script` in the page, returning its value by value.
    ///
    /// A script that throws yields [`Error::ScriptExecutionFailed`].
    pub async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult> {
        debug!("Evaluating script: {}", script);

        let response = self
            .session
            .execute(&Evaluate {
                expression: script.to_string(),
                await_promise: Some(await_promise),
                return_by_value: Some(true),
                context_id: None,
            })
            .await?;

        if let Some(exception) = &response.exception_details {
            return Err(Error::script_execution_failed(exception.message()));
        }

        Ok(EvaluationResult::from(&response.result))
    }

    /// Stream of `Runtime.consoleAPICalled`
    pub fn on_console_api_called(&self) -> BoxStream<'static, ConsoleApiCalled> {
        standing_view(&self.console_api_called, &self.session).subscribe()
    }

    /// Stream of `Runtime.exceptionThrown`
    pub fn on_exception_thrown(&self) -> BoxStream<'static, ExceptionThrown> {
        standing_view(&self.exception_thrown, &self.session).subscribe()
    }
}
