use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use job_spec::JobParameters;
use remote_store::{FsStore, GcsStore, RemoteStore, StoreRegistry};
use shepherd_runtime::{
    execute_with_options, ExecOptions, JobLayout, MountConfig, Strategy, StrategyKind,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "shepherdctl",
    version,
    about = "Execute a command with inputs localized from remote storage and outputs uploaded afterwards"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job step described by a JSON file
    Exec {
        /// Path to the job descriptor
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Localization strategy: "download" or "gcsfuse"
        #[arg(short, long, env = "SHEPHERD_STRATEGY", default_value = "download")]
        strategy: StrategyKind,
        /// Directory in which the tmp-work-* job root is created
        #[arg(long, env = "SHEPHERD_WORK_ROOT", default_value = ".")]
        work_root: PathBuf,
        /// Serve file:// references from this directory
        #[arg(long, env = "SHEPHERD_STORE_ROOT")]
        store_root: Option<PathBuf>,
        /// Program used to mount buckets for the gcsfuse strategy
        #[arg(long, env = "SHEPHERD_MOUNT_PROGRAM", default_value = "gcsfuse")]
        mount_program: String,
        /// Program used to unmount buckets
        #[arg(long, env = "SHEPHERD_UNMOUNT_PROGRAM", default_value = "umount")]
        unmount_program: String,
        /// Container runtime used for jobs with a docker_image
        #[arg(long, env = "SHEPHERD_CONTAINER_RUNTIME", default_value = "docker")]
        container_runtime: String,
    },
    /// Check a job descriptor without running it
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print version and exit
    Version,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Exec {
            file,
            strategy,
            work_root,
            store_root,
            mount_program,
            unmount_program,
            container_runtime,
        } => {
            let params = load(&file)?;
            let store = build_store(store_root.as_deref())?;
            let mount = MountConfig {
                mount_program,
                unmount_program,
                ..MountConfig::default()
            };
            let options = ExecOptions { container_runtime };
            match run(&params, strategy, &work_root, store, mount, &options) {
                Ok(exit_code) => println!("exit code: {exit_code}"),
                Err(e) => {
                    eprintln!("Error running job: {e:#}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Validate { file } => match load(&file) {
            Ok(_) => println!("ok"),
            Err(e) => {
                eprintln!("{e:#}");
                std::process::exit(1);
            }
        },
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

fn load(file: &Path) -> Result<JobParameters> {
    JobParameters::from_file(file)
        .with_context(|| format!("failed to load job descriptor {}", file.display()))
}

fn build_store(store_root: Option<&Path>) -> Result<Arc<dyn RemoteStore>> {
    let mut registry = StoreRegistry::new();
    registry.register("gs", Arc::new(GcsStore::from_env()?));
    if let Some(root) = store_root {
        registry.register("file", Arc::new(FsStore::new(root)));
    }
    tracing::debug!(schemes = ?registry.schemes().collect::<Vec<_>>(), "remote stores ready");
    Ok(Arc::new(registry))
}

fn run(
    params: &JobParameters,
    kind: StrategyKind,
    work_root: &Path,
    store: Arc<dyn RemoteStore>,
    mount: MountConfig,
    options: &ExecOptions,
) -> Result<i32> {
    std::fs::create_dir_all(work_root)
        .with_context(|| format!("failed to create {}", work_root.display()))?;
    let root = tempfile::Builder::new()
        .prefix("tmp-work-")
        .tempdir_in(work_root)
        .context("failed to create job root")?
        .keep();
    let layout = JobLayout::under(root);
    tracing::info!(workdir = %layout.workdir().display(), strategy = %kind, "executing job in new directory");

    let mut strategy = Strategy::new(kind, &layout, store, mount)?;
    let result = execute_with_options(&layout, params, &mut strategy, options)?;
    Ok(result.exit_code)
}
