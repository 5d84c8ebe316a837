//! The `Oracle` collaborator — structured output generation.
//!
//! An Oracle turns a prompt into text that is expected to be a JSON object
//! of a known shape. [`invoke`] parses and validates that text into a typed
//! record; malformed or mismatched output is always an error, never `None`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why an Oracle call produced no usable record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    /// The backing service could not be reached or refused the request.
    #[error("oracle unreachable: {0}")]
    Unreachable(String),

    /// The response was not parseable JSON.
    #[error("malformed oracle output: {0}")]
    MalformedOutput(String),

    /// The response parsed but does not satisfy the expected schema.
    #[error("oracle output does not match schema '{schema}': {message}")]
    SchemaMismatch { schema: String, message: String },
}

/// A fully rendered prompt plus the schema the answer must follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    /// Name of the expected output schema.
    pub schema: String,
    pub system: String,
    pub user: String,
}

/// A record type an Oracle can be asked to produce.
pub trait StructuredOutput: DeserializeOwned {
    /// Stable name used in errors and by stubs to route responses.
    const SCHEMA_NAME: &'static str;

    /// Checks that serde cannot express, such as numeric ranges.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Return the raw text answer for `request`.
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Ask `oracle` for a `T` and validate the answer.
pub async fn invoke<T: StructuredOutput>(
    oracle: &dyn Oracle,
    system: impl Into<String>,
    user: impl Into<String>,
) -> Result<T, OracleError> {
    let request = OracleRequest {
        schema: T::SCHEMA_NAME.to_owned(),
        system: system.into(),
        user: user.into(),
    };

    let text = oracle.generate(&request).await?;
    parse_output(&text)
}

/// Parse raw Oracle text into a validated `T`.
pub fn parse_output<T: StructuredOutput>(text: &str) -> Result<T, OracleError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| OracleError::MalformedOutput(e.to_string()))?;

    let record: T = serde_json::from_value(value).map_err(|e| OracleError::SchemaMismatch {
        schema: T::SCHEMA_NAME.to_owned(),
        message: e.to_string(),
    })?;

    record.validate().map_err(|message| OracleError::SchemaMismatch {
        schema: T::SCHEMA_NAME.to_owned(),
        message,
    })?;

    Ok(record)
}

/// Models occasionally wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Shared range check for the 0–100 confidence every signal carries.
pub fn check_confidence(confidence: f64) -> Result<(), String> {
    if (0.0..=100.0).contains(&confidence) {
        Ok(())
    } else {
        Err(format!("confidence {confidence} is outside 0..=100"))
    }
}
