use crate::fsutil::{absolutize, relative_slash};
use crate::{Result, ShepherdError};
use std::path::{Path, PathBuf};

/// Path inside the container where the job root is bind-mounted.
pub const CONTAINER_WORK_ROOT: &str = "/mnt/shepherd";

/// Wraps a command so it runs inside a container with the job root mounted
/// read-write at [`CONTAINER_WORK_ROOT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    runtime: String,
    image: String,
    host_root: PathBuf,
    container_cwd: String,
}

impl ContainerInvocation {
    /// `cwd` must lie under `root`; it becomes the in-container working directory.
    pub fn new(runtime: &str, image: &str, root: &Path, cwd: &Path) -> Result<Self> {
        let host_root = absolutize(root)?;
        let abs_cwd = absolutize(cwd)?;
        let rel = relative_slash(&host_root, &abs_cwd).ok_or_else(|| ShepherdError::Unsupported {
            message: format!(
                "working directory {} is outside the job root {}",
                abs_cwd.display(),
                host_root.display()
            ),
        })?;
        let container_cwd = if rel.is_empty() {
            CONTAINER_WORK_ROOT.to_string()
        } else {
            format!("{CONTAINER_WORK_ROOT}/{rel}")
        };
        Ok(Self {
            runtime: runtime.to_string(),
            image: image.to_string(),
            host_root,
            container_cwd,
        })
    }

    pub fn container_cwd(&self) -> &str {
        &self.container_cwd
    }

    /// Full argument vector, program first.
    pub fn argv(&self, command: &[String]) -> Vec<String> {
        let mut argv = vec![
            self.runtime.clone(),
            "run".to_string(),
            "-v".to_string(),
            format!("{}:{}", self.host_root.display(), CONTAINER_WORK_ROOT),
            "-w".to_string(),
            self.container_cwd.clone(),
            "--interactive".to_string(),
            "--rm".to_string(),
            self.image.clone(),
        ];
        argv.extend(command.iter().cloned());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_mounts_root_and_preserves_command_order() {
        let invocation = ContainerInvocation::new(
            "docker",
            "ubuntu:22.04",
            Path::new("/jobs/tmp-work-1"),
            Path::new("/jobs/tmp-work-1/work/sub"),
        )
        .unwrap();
        let argv = invocation.argv(&["sh".to_string(), "-c".to_string(), "echo hi".to_string()]);
        assert_eq!(
            argv,
            vec![
                "docker",
                "run",
                "-v",
                "/jobs/tmp-work-1:/mnt/shepherd",
                "-w",
                "/mnt/shepherd/work/sub",
                "--interactive",
                "--rm",
                "ubuntu:22.04",
                "sh",
                "-c",
                "echo hi",
            ]
        );
    }

    #[test]
    fn cwd_at_root_maps_to_mount_point() {
        let invocation =
            ContainerInvocation::new("podman", "img", Path::new("/r"), Path::new("/r")).unwrap();
        assert_eq!(invocation.container_cwd(), "/mnt/shepherd");
        assert_eq!(invocation.argv(&[])[0], "podman");
    }

    #[test]
    fn cwd_outside_root_is_rejected() {
        let err = ContainerInvocation::new("docker", "img", Path::new("/r"), Path::new("/elsewhere"))
            .unwrap_err();
        assert!(err.to_string().contains("outside the job root"));
    }
}
