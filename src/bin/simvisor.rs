use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use simvisor::diagnose::{DiagnosticReport, Evidence};
use simvisor::locate::{locate_launcher, resolve_executable};
use simvisor::preflight::run_preflight;
use simvisor::{
    Config, DomainSpec, LogWriter, RunLogFile, RunOutcome, RunRequest, ShutdownSignal, Subscribe,
    Supervisor, cancel_on_signal,
};

#[derive(Parser)]
#[command(name = "simvisor")]
#[command(about = "Run and supervise CompLaB3D simulations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the solver for a project directory
    Run {
        #[command(flatten)]
        project: ProjectArgs,
        /// Also write output/simulation_<timestamp>.log
        #[arg(long)]
        log_file: bool,
        /// Do not echo raw solver output
        #[arg(long, short)]
        quiet: bool,
    },
    /// Run the pre-flight checks only
    Check {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Explain a solver exit code
    Explain {
        /// Exit code as reported by the OS (negative values allowed)
        #[arg(allow_negative_numbers = true)]
        code: i64,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory (contains CompLaB.xml, input/, output/)
    project_dir: PathBuf,
    /// Solver executable, used as given (default: $COMPLAB_PATH, PATH, common install locations)
    #[arg(long)]
    exe: Option<PathBuf>,
    /// Configuration file, relative to the project directory
    #[arg(long)]
    xml: Option<PathBuf>,
    /// MPI launcher (mpirun, mpiexec, srun or a path)
    #[arg(long)]
    mpi: Option<String>,
    /// Number of MPI processes
    #[arg(long, default_value_t = 1)]
    np: u32,
    /// Geometry file name inside input/
    #[arg(long, requires = "nx", requires = "ny", requires = "nz")]
    geometry: Option<String>,
    #[arg(long)]
    nx: Option<u64>,
    #[arg(long)]
    ny: Option<u64>,
    #[arg(long)]
    nz: Option<u64>,
    /// Valid material numbers in the geometry file (comma separated)
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    materials: Vec<i64>,
}

impl ProjectArgs {
    fn request(&self) -> anyhow::Result<RunRequest> {
        let exe = resolve_executable(self.exe.as_deref(), &self.project_dir);
        let mut req = RunRequest::new(exe, &self.project_dir);

        if let Some(xml) = &self.xml {
            req = req.with_xml_config(xml);
        }
        if self.np > 1 {
            let launcher = match locate_launcher(self.mpi.as_deref()) {
                Some(path) => path.to_string_lossy().into_owned(),
                None => bail!(
                    "no MPI launcher found ({}); install MPI or pass --mpi",
                    self.mpi.as_deref().unwrap_or("mpirun, mpiexec, srun")
                ),
            };
            req = req.with_parallel(launcher, self.np);
        }
        if let (Some(file), Some(nx), Some(ny), Some(nz)) = (&self.geometry, self.nx, self.ny, self.nz)
        {
            let mut domain = DomainSpec::new(file.clone(), nx, ny, nz);
            if !self.materials.is_empty() {
                domain = domain.with_materials(self.materials.iter().copied());
            }
            req = req.with_domain(domain);
        }
        Ok(req)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            project,
            log_file,
            quiet,
        } => cmd_run(&project, log_file, quiet).await,
        Commands::Check { project } => cmd_check(&project).await,
        Commands::Explain { code } => Ok(cmd_explain(code)),
    }
}

async fn cmd_run(project: &ProjectArgs, log_file: bool, quiet: bool) -> anyhow::Result<ExitCode> {
    let req = project.request()?;

    let writer = if quiet {
        LogWriter::new().without_solver_output()
    } else {
        LogWriter::new()
    };
    let mut subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(writer)];
    if log_file {
        subs.push(Arc::new(RunLogFile::in_dir(req.output_dir())));
    }
    let sup = Supervisor::builder(Config::default())
        .with_subscribers(subs)
        .build();

    let run = match sup.start(req).await {
        Ok(run) => run,
        Err(err) => {
            sup.close().await;
            return Err(err).context("simulation did not start");
        }
    };
    let signals = cancel_on_signal(Arc::clone(&sup));
    let report = run.wait().await;
    // Only a signal cancels a CLI run; its task has returned by now.
    let signal = if report.outcome.is_cancelled() {
        signals.await.ok().flatten()
    } else {
        signals.abort();
        None
    };
    sup.close().await;

    println!("{}", report.summary);
    Ok(ExitCode::from(exit_status_for(&report.outcome, signal)))
}

async fn cmd_check(project: &ProjectArgs) -> anyhow::Result<ExitCode> {
    let req = project.request()?;
    let issues = tokio::task::spawn_blocking(move || run_preflight(&req)).await?;

    for issue in &issues {
        println!("{issue}\n");
    }
    if issues.iter().any(|i| i.is_blocking()) {
        return Ok(ExitCode::FAILURE);
    }
    println!("Pre-flight checks passed for {}", project.project_dir.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_explain(code: i64) -> ExitCode {
    print!("{}", DiagnosticReport::build(code, Evidence::default()).render());
    ExitCode::SUCCESS
}

/// Mirrors the solver's status where the shell can represent it.
///
/// A cancelled run exits with the status of the signal that stopped it.
fn exit_status_for(outcome: &RunOutcome, signal: Option<ShutdownSignal>) -> u8 {
    match outcome {
        RunOutcome::Succeeded => 0,
        RunOutcome::Cancelled => signal.unwrap_or(ShutdownSignal::Interrupt).exit_status(),
        RunOutcome::Failed { exit_code } => match u8::try_from(*exit_code) {
            Ok(code) if code != 0 => code,
            _ => 1,
        },
        RunOutcome::NotStarted { .. } | RunOutcome::Aborted { .. } => 1,
    }
}
