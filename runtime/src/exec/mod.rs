//! The job-step orchestrator.
//!
//! `validate -> prepare -> run -> persist result -> upload outputs`, with the
//! strategy's `clean` guaranteed once preparation has begun.

use crate::fsutil::{ensure_dir, ensure_parent_dir};
use crate::layout::JobLayout;
use crate::localize::Localizer;
use crate::outputs::find_new_files;
use crate::{Result, ShepherdError};
use job_spec::{ExecutionResult, FilterChain, JobParameters, RemoteRef, Upload};
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

mod capture;
mod container;

pub use container::{ContainerInvocation, CONTAINER_WORK_ROOT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Program used to run `docker_image` jobs.
    pub container_runtime: String,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            container_runtime: "docker".to_string(),
        }
    }
}

pub fn execute(
    layout: &JobLayout,
    params: &JobParameters,
    localizer: &mut dyn Localizer,
) -> Result<ExecutionResult> {
    execute_with_options(layout, params, localizer, &ExecOptions::default())
}

/// Runs one job step. A non-zero exit of the command is reported in the
/// returned result, not as an error.
pub fn execute_with_options(
    layout: &JobLayout,
    params: &JobParameters,
    localizer: &mut dyn Localizer,
    options: &ExecOptions,
) -> Result<ExecutionResult> {
    params.validate()?;
    ensure_dir(layout.workdir())?;

    let mut guard = CleanupGuard::new(localizer);
    let outcome = run_job(layout, params, guard.localizer(), options);
    let cleaned = guard.clean();

    match (outcome, cleaned) {
        (Ok(result), Ok(())) => Ok(result),
        (Ok(_), Err(clean_err)) => Err(clean_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(clean_err)) => {
            error!(error = %clean_err, "cleanup failed after job failure");
            Err(err)
        }
    }
}

fn run_job(
    layout: &JobLayout,
    params: &JobParameters,
    localizer: &mut dyn Localizer,
    options: &ExecOptions,
) -> Result<ExecutionResult> {
    let workdir = layout.workdir();

    info!(count = params.downloads.len(), "localizing inputs");
    localizer.prepare(&params.downloads)?;

    let cwd = match &params.working_path {
        Some(sub) => {
            let cwd = workdir.join(sub);
            ensure_dir(&cwd)?;
            cwd
        }
        None => workdir.to_path_buf(),
    };

    let argv = match &params.docker_image {
        Some(image) => {
            ContainerInvocation::new(&options.container_runtime, image, layout.root(), &cwd)?
                .argv(&params.command)
        }
        None => params.command.clone(),
    };

    let exit_code = run_command(
        &argv,
        &cwd,
        workdir,
        params.stdout_path.as_deref(),
        params.stderr_path.as_deref(),
    )?;
    let result = ExecutionResult { exit_code };

    if let Some(result_path) = &params.result_path {
        write_result(&workdir.join(result_path), &result)?;
    }

    if let Some(spec) = &params.uploads {
        let filters = FilterChain::compile(&spec.filters)?;
        let prefix = RemoteRef::parse(&spec.destination_url_prefix)?;
        let uploads: Vec<Upload> = find_new_files(workdir, &filters, |p| localizer.was_localized(p))?
            .into_iter()
            .map(|source_path| Upload {
                destination: prefix.join(&source_path),
                source_path,
            })
            .collect();
        info!(count = uploads.len(), prefix = %prefix, "uploading outputs");
        localizer.upload(&uploads)?;
    }

    Ok(result)
}

fn run_command(
    argv: &[String],
    cwd: &Path,
    workdir: &Path,
    stdout_path: Option<&str>,
    stderr_path: Option<&str>,
) -> Result<i32> {
    let (program, args) = argv.split_first().ok_or(job_spec::ConfigError::EmptyCommand)?;
    let (stdout, stderr) = capture::open_capture(workdir, stdout_path, stderr_path)?;

    info!(command = %shell_join(argv), cwd = %cwd.display(), "starting command");
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|source| ShepherdError::ProcessLaunch {
            program: program.clone(),
            action: "launch",
            source,
        })?;
    let status = child.wait().map_err(|source| ShepherdError::ProcessLaunch {
        program: program.clone(),
        action: "wait for",
        source,
    })?;

    let exit_code = status.code().unwrap_or(-1);
    if status.success() {
        info!(exit_code, "command finished");
    } else {
        warn!(exit_code, %status, "command exited unsuccessfully");
    }
    Ok(exit_code)
}

fn write_result(path: &Path, result: &ExecutionResult) -> Result<()> {
    ensure_parent_dir(path)?;
    let body = serde_json::to_vec(result).map_err(|e| {
        ShepherdError::io(
            format!("failed to encode result for {}", path.display()),
            e.into(),
        )
    })?;
    fs::write(path, body)
        .map_err(|e| ShepherdError::io(format!("failed to write result {}", path.display()), e))
}

/// Runs `clean` exactly once: explicitly through [`CleanupGuard::clean`], or
/// on drop if the job unwinds first.
struct CleanupGuard<'a> {
    localizer: &'a mut dyn Localizer,
    cleaned: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(localizer: &'a mut dyn Localizer) -> Self {
        Self {
            localizer,
            cleaned: false,
        }
    }

    fn localizer(&mut self) -> &mut dyn Localizer {
        &mut *self.localizer
    }

    fn clean(&mut self) -> Result<()> {
        self.cleaned = true;
        self.localizer.clean()
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if !self.cleaned {
            self.cleaned = true;
            if let Err(err) = self.localizer.clean() {
                error!(error = %err, "cleanup failed while unwinding");
            }
        }
    }
}

fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}
