//! Validation of raw payloads against the published API schemas.

use core::fmt;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use thiserror::Error;

const GET_OPERATIONAL_INTENT_DETAILS_RESPONSE: &str =
    include_str!("../schemas/get_operational_intent_details_response.json");

/// Schemas this crate knows how to check payloads against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SchemaId {
    /// ASTM F3548-21 `getOperationalIntentDetails` 200 response.
    GetOperationalIntentDetailsResponse,
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetOperationalIntentDetailsResponse => {
                f.write_str("F3548-21 GetOperationalIntentDetailsResponse")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaViolation {
    pub json_path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "At {} in the response: {}", self.json_path, self.message)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("embedded schema {schema} is not valid JSON: {source}")]
    Parse {
        schema: SchemaId,
        source: serde_json::Error,
    },

    #[error("embedded schema {schema} failed to compile: {message}")]
    Compile { schema: SchemaId, message: String },
}

/// Checks a payload for conformance; an empty result means conformant.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: SchemaId, payload: &Value) -> Vec<SchemaViolation>;
}

/// [`SchemaValidator`] backed by compiled JSON schemas derived from the
/// OpenAPI definitions.
#[derive(Debug)]
pub struct OpenApiSchemaValidator {
    details_response: JSONSchema,
}

impl OpenApiSchemaValidator {
    pub fn new() -> Result<Self, SchemaError> {
        Ok(Self {
            details_response: compile(
                SchemaId::GetOperationalIntentDetailsResponse,
                GET_OPERATIONAL_INTENT_DETAILS_RESPONSE,
            )?,
        })
    }
}

impl SchemaValidator for OpenApiSchemaValidator {
    fn validate(&self, schema: SchemaId, payload: &Value) -> Vec<SchemaViolation> {
        let compiled = match schema {
            SchemaId::GetOperationalIntentDetailsResponse => &self.details_response,
        };

        match compiled.validate(payload) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    SchemaViolation {
                        json_path: if path.is_empty() {
                            "$".to_owned()
                        } else {
                            format!("${path}")
                        },
                        message: error.to_string(),
                    }
                })
                .collect(),
        }
    }
}

fn compile(schema: SchemaId, source: &str) -> Result<JSONSchema, SchemaError> {
    let document: Value =
        serde_json::from_str(source).map_err(|source| SchemaError::Parse { schema, source })?;

    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&document)
        .map_err(|error| SchemaError::Compile {
            schema,
            message: error.to_string(),
        })
}
