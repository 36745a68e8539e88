use crate::{ConfigError, FilterChain, JobParameters, RemoteRef};
use std::path::{Component, Path};

/// Checks that `path` is relative and never climbs out of the directory it is
/// resolved against.
pub fn validate_path(path: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.starts_with('/') || Path::new(path).is_absolute() {
        return Err(invalid("was not a relative path"));
    }

    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(invalid(
                    "paths are not allowed to reference parent directories",
                ))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("was not a relative path"))
            }
        }
    }

    Ok(())
}

pub fn validate_reference(reference: &str) -> Result<RemoteRef, ConfigError> {
    RemoteRef::parse(reference)
}

/// A download source must also name an object whose key stays inside its
/// bucket when laid out as a path (no leading `/`, no `..`).
pub fn validate_download_source(reference: &str) -> Result<RemoteRef, ConfigError> {
    let parsed = validate_reference(reference)?;
    let key = parsed.key();
    let escapes = key.starts_with('/')
        || Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if key.is_empty() || escapes {
        return Err(ConfigError::InvalidReference {
            reference: reference.to_string(),
            reason: if key.is_empty() {
                "download source must name an object".to_string()
            } else {
                "object key must not reference parent directories or be absolute".to_string()
            },
        });
    }
    Ok(parsed)
}

fn validate_destination(path: &str) -> Result<(), ConfigError> {
    validate_path(path)?;
    let names_file = Path::new(path)
        .components()
        .any(|c| matches!(c, Component::Normal(_)));
    if !names_file {
        return Err(ConfigError::InvalidPath {
            path: path.to_string(),
            reason: "download destination must name a file".to_string(),
        });
    }
    Ok(())
}

impl JobParameters {
    /// Returns the first violation found; nothing is touched on disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }

        if let Some(uploads) = &self.uploads {
            validate_reference(&uploads.destination_url_prefix)?;
            FilterChain::compile(&uploads.filters)?;
        }

        for download in &self.downloads {
            validate_download_source(&download.source_url)?;
            validate_destination(&download.destination_path)?;
        }

        let relative_paths = [
            &self.working_path,
            &self.stdout_path,
            &self.stderr_path,
            &self.result_path,
        ];
        for path in relative_paths.into_iter().flatten() {
            validate_path(path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Download, Filter, UploadSpec};

    #[test]
    fn path_validation_accepts_relative_paths() {
        assert!(validate_path("rel/path").is_ok());
        assert!(validate_path("./rel").is_ok());
        assert!(validate_path("file.txt").is_ok());
    }

    #[test]
    fn path_validation_rejects_absolute_and_parent_paths() {
        assert!(matches!(
            validate_path("/abs/path"),
            Err(ConfigError::InvalidPath { .. })
        ));
        assert!(matches!(
            validate_path("a/../b"),
            Err(ConfigError::InvalidPath { .. })
        ));
        assert!(matches!(
            validate_path(".."),
            Err(ConfigError::InvalidPath { .. })
        ));
    }

    #[test]
    fn empty_command_is_rejected_first() {
        let params = JobParameters {
            downloads: vec![Download::new("nonsense", "/abs")],
            ..JobParameters::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn upload_prefix_is_checked_before_downloads() {
        let mut params = JobParameters::new(["true"]);
        params.uploads = Some(UploadSpec {
            filters: vec![Filter::include("*")],
            destination_url_prefix: "not-a-url".to_string(),
        });
        params.downloads = vec![Download::new("gs://b/k", "/abs")];

        match params.validate() {
            Err(ConfigError::InvalidReference { reference, .. }) => {
                assert_eq!(reference, "not-a-url")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn download_destination_must_stay_inside_workdir() {
        let mut params = JobParameters::new(["true"]);
        params.downloads = vec![Download::new("gs://b/k", "in/../../escape")];
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidPath { .. })
        ));

        params.downloads = vec![Download::new("gs://b/k", ".")];
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidPath { .. })
        ));
    }

    #[test]
    fn download_source_keys_cannot_leave_the_bucket() {
        for source in [
            "gs://b/../../etc/passwd",
            "gs://b/in/../../x",
            "gs://b//etc/passwd",
            "gs://b",
        ] {
            let mut params = JobParameters::new(["true"]);
            params.downloads = vec![Download::new(source, "in")];
            match params.validate() {
                Err(ConfigError::InvalidReference { reference, .. }) => {
                    assert_eq!(reference, source)
                }
                other => panic!("{source}: unexpected result: {other:?}"),
            }
        }
        assert!(validate_download_source("gs://b/dir/./file").is_ok());
    }

    #[test]
    fn capture_paths_are_validated() {
        let mut params = JobParameters::new(["true"]);
        params.stderr_path = Some("/var/log/err".to_string());
        match params.validate() {
            Err(ConfigError::InvalidPath { path, .. }) => assert_eq!(path, "/var/log/err"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_glob_is_a_config_error() {
        let mut params = JobParameters::new(["true"]);
        params.uploads = Some(UploadSpec {
            filters: vec![Filter::include("[unclosed")],
            destination_url_prefix: "gs://mock".to_string(),
        });
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn well_formed_parameters_pass() {
        let mut params = JobParameters::new(["cp", "1", "2"]);
        params.downloads = vec![Download::new("gs://mock/1", "1")];
        params.uploads = Some(UploadSpec {
            filters: vec![Filter::include("*")],
            destination_url_prefix: "gs://mock".to_string(),
        });
        params.working_path = Some("sub".to_string());
        params.result_path = Some("result.json".to_string());
        assert!(params.validate().is_ok());
    }
}
