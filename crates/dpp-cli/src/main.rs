mod cmd;
mod output;

use clap::{ArgAction, Parser, Subcommand};
use cmd::{probe::ProbeSubcommand, spec::SpecSubcommand, Globals};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "dppctl",
    about = "Verify a pipeline deployment spec against the cloud resources it declares",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Deployment spec document
    #[arg(
        short = 'f',
        long = "file",
        global = true,
        env = "DPPCTL_SPEC",
        default_value = "depl/aws-dev-sample.yaml"
    )]
    file: PathBuf,

    /// Cloud region (default: first region declared in the spec)
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Named credentials profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Per-probe timeout in seconds (the identity check is always 5s)
    #[arg(
        long,
        global = true,
        env = "DPPCTL_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Provider CLI binary
    #[arg(long = "aws-bin", global = true, env = "DPPCTL_AWS_BIN", default_value = "aws")]
    aws_bin: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every verification phase and print the report
    Check {
        /// Exit non-zero when any phase failed
        #[arg(long)]
        strict: bool,
        /// Workflow CLI command to run (default: "dags list -o json")
        #[arg(long)]
        command: Option<String>,
    },

    /// Inspect the deployment spec
    Spec {
        #[command(subcommand)]
        subcommand: SpecSubcommand,
    },

    /// Run a single probe
    Probe {
        #[command(subcommand)]
        subcommand: ProbeSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Check { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let globals = Globals {
        spec_path: cli.file,
        region: cli.region,
        profile: cli.profile,
        timeout: Duration::from_secs(cli.timeout),
        aws_bin: cli.aws_bin,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Check { strict, command } => cmd::check::run(&globals, strict, command),
        Commands::Spec { subcommand } => cmd::spec::run(&globals, subcommand),
        Commands::Probe { subcommand } => cmd::probe::run(&globals, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
