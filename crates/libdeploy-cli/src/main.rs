mod cmd;
mod output;
mod toolchain;

use clap::{Parser, Subcommand};
use cmd::TargetArgs;
use libdeploy_core::config::DeployConfig;
use libdeploy_core::error::Interrupted;
use libdeploy_core::types::Platform;

/// Exit status a shell reports for a process stopped by Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "libdeploy",
    about = "Copy the runtime libraries a linked binary needs next to it",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log every library, not just the summary
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the binary's runtime libraries into its directory
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        /// Always copy; never hard link
        #[arg(long)]
        copy_only: bool,
    },

    /// Show which libraries `deploy` would place, without writing anything
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Classify dependency names as deployable or system libraries
    Classify {
        /// Library names or install names
        #[arg(required = true)]
        names: Vec<String>,

        /// Platform whose rules apply (default: host)
        #[arg(long)]
        platform: Option<Platform>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = DeployConfig::from_env();
    config.verbose |= cli.verbose;

    let result = match &cli.command {
        Commands::Deploy { target, copy_only } => {
            cmd::deploy::run(target, *copy_only, &config, cli.json)
        }
        Commands::Plan { target } => cmd::plan::run(target, &config, cli.json),
        Commands::Classify { names, platform } => cmd::classify::run(names, *platform, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        if e.is::<Interrupted>() {
            std::process::exit(EXIT_INTERRUPTED);
        }
        std::process::exit(1);
    }
}
