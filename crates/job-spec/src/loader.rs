use crate::{ConfigError, JobParameters};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

const JOB_PARAMETERS_SCHEMA: &str = include_str!("../schema/job-parameters.v1.json");

/// Structural check of a raw descriptor against the embedded JSON Schema.
pub fn check_schema(source_name: &str, descriptor: &Value) -> Result<(), ConfigError> {
    let schema_error = |message: String| ConfigError::Schema {
        source_name: source_name.to_string(),
        errors: vec![message],
    };

    let schema_value: Value = serde_json::from_str(JOB_PARAMETERS_SCHEMA)
        .map_err(|e| schema_error(format!("failed to parse job schema: {}", e)))?;

    let schema = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema_value)
        .map_err(|e| schema_error(format!("failed to compile job schema: {}", e)))?;

    let result = schema.validate(descriptor);
    if let Err(errors) = result {
        let errors: Vec<String> = errors
            .map(|error| format!("{} at '{}'", error, error.instance_path))
            .collect();
        return Err(ConfigError::Schema {
            source_name: source_name.to_string(),
            errors,
        });
    }

    Ok(())
}

impl JobParameters {
    /// Parses, schema-checks and validates a descriptor. `source_name` only
    /// labels error messages.
    #[instrument(skip(raw))]
    pub fn from_json_str(source_name: &str, raw: &str) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            source_name: source_name.to_string(),
            message,
        };

        let descriptor: Value = serde_json::from_str(raw).map_err(|e| parse_error(e.to_string()))?;
        check_schema(source_name, &descriptor)?;

        let params: JobParameters =
            serde_json::from_value(descriptor).map_err(|e| parse_error(e.to_string()))?;
        params.validate()?;

        debug!(
            downloads = params.downloads.len(),
            has_uploads = params.uploads.is_some(),
            "job descriptor loaded"
        );
        Ok(params)
    }

    #[instrument]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&path.display().to_string(), &raw)
    }
}
