//! vmvisor command line: runs one machine on the simulated platform until a
//! termination signal asks it to shut down.

mod logging;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use vmvisor::{
    ArtifactPaths, Config, GIB, LogWriter, Mode, SessionBuilder, Subscribe, VmError,
    platform::sim::{SimScript, SimulatedPlatform},
};

#[derive(Parser, Debug)]
#[command(
    name = "vmvisor",
    version,
    about = "Provision, launch and gracefully shut down a virtual machine"
)]
struct Args {
    /// Run in install mode instead of booting the machine
    #[arg(long)]
    install: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bundle directory holding the disk image and identity artifacts
    #[arg(short, long)]
    bundle: Option<PathBuf>,

    /// Requested CPU count (clamped to platform bounds)
    #[arg(long)]
    cpus: Option<u32>,

    /// Requested memory in GiB (clamped to platform bounds)
    #[arg(long)]
    memory_gib: Option<u64>,

    /// Disk image capacity in GiB, used when the image is first created
    #[arg(long)]
    disk_gib: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn config(&self) -> Result<Config, VmError> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.bundle {
            cfg.artifacts = ArtifactPaths::in_bundle(dir);
        }
        if let Some(cpus) = self.cpus {
            cfg.resources.cpu_count = Some(cpus);
        }
        if let Some(gib) = self.memory_gib {
            cfg.resources.memory_size = Some(gib.saturating_mul(GIB));
        }
        if let Some(gib) = self.disk_gib {
            cfg.disk_size = gib.saturating_mul(GIB);
        }
        Ok(cfg)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();

    let cfg = match args.config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if args.print_config {
        print!("{}", cfg.to_toml());
        return ExitCode::SUCCESS;
    }

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let session = SessionBuilder::new(cfg, SimulatedPlatform::new(SimScript::default()))
        .with_subscribers(subs)
        .build();
    let mode = if args.install { Mode::Install } else { Mode::Run };

    match session.run(mode, CancellationToken::new()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "failed to run");
            ExitCode::FAILURE
        }
    }
}
