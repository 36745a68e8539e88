use crate::RemoteRef;
use serde::{Deserialize, Deserializer, Serialize};

/// Full declarative description of one job step.
///
/// Optional paths are relative to the working directory. An empty string in a
/// descriptor is read as "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    pub command: Vec<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub docker_image: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub downloads: Vec<Download>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads: Option<UploadSpec>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub stdout_path: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub stderr_path: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub result_path: Option<String>,
}

impl JobParameters {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// A remote input staged into the working directory before the command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub source_url: String,
    pub destination_path: String,
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub symlink_safe: bool,
}

impl Download {
    pub fn new(source_url: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            executable: false,
            symlink_safe: false,
        }
    }
}

/// One step of an upload filter chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub pattern: String,
    #[serde(default)]
    pub exclude: bool,
}

impl Filter {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exclude: false,
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exclude: true,
        }
    }
}

/// Ordered filters plus the prefix every selected file is uploaded under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<Filter>,
    pub destination_url_prefix: String,
}

/// A produced file resolved to its remote destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub source_path: String,
    pub destination: RemoteRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
