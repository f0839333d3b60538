//! fleetpkg - install Debian packages on a cluster fleet
//!
//! Usage:
//!   fleetpkg install 'node[1-3]' - htop tree    # prompt for the sudo password
//!   fleetpkg install --keep-going 'node[1-8]' - a b c
//!   fleetpkg install --format json node1 - htop

mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::Password;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetpkg_core::config::ConfigStore;
use fleetpkg_core::context::AppContext;
use fleetpkg_core::install::BatchPolicy;
use fleetpkg_core::preflight;
use fleetpkg_core::types::{Credential, NodeSelector};

/// Exit code when one or more packages failed to install.
const EXIT_INSTALL_FAILED: i32 = 4;
/// Exit code for unusable arguments or configuration.
const EXIT_USAGE: i32 = 1;

#[derive(Parser)]
#[command(name = "fleetpkg", version)]
#[command(about = "Install Debian packages and their dependencies on cluster nodes", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/fleetpkg/fleetpkg.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, download and install packages on every selected node
    ///
    /// Packages are installed one after another. The control host must run
    /// the same distribution as the nodes, and the nodes' sshd must accept
    /// the credential variable (e.g. `AcceptEnv FLEETPKG_*`).
    Install(InstallArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// pdsh host list, e.g. 'node[1-3]' or 'node1,node4'
    nodes: String,

    /// sudo password on the nodes; '-' prompts without echo
    credential: String,

    /// Packages to install, in order
    #[arg(required = true)]
    packages: Vec<String>,

    /// Attempt every package even after one fails
    #[arg(long)]
    keep_going: bool,

    /// Local directory for <package>_STAGE (overrides the config file)
    #[arg(long, value_name = "DIR")]
    staging_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    /// Progress lines and a per-package summary
    #[default]
    Table,
    /// Machine-readable JSON report on stdout
    Json,
}

fn main() {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpkg=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are not errors
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Install(args) => run_install(cli.config, args),
    }
}

fn run_install(config: Option<PathBuf>, args: InstallArgs) -> Result<i32> {
    if let Err(err) = preflight::check_host_os() {
        eprintln!("{} {}", style("error:").red().bold(), err);
        return Ok(err.exit_code());
    }

    let store = match config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    let mut context = AppContext::from_store(&store)?;
    if let Some(root) = args.staging_root {
        context = context.with_staging_root(root);
    }

    if let Err(err) = preflight::check_tools(&context.config().tools) {
        eprintln!("{} {}", style("error:").red().bold(), err);
        return Ok(err.exit_code());
    }

    let credential = read_credential(&args.credential)?;
    let nodes = NodeSelector::new(args.nodes);
    let policy = if args.keep_going {
        BatchPolicy::KeepGoing
    } else {
        BatchPolicy::AbortOnFirstFailure
    };
    let format = args.format;

    let report = context.batch_installer(policy).install_all(
        &args.packages,
        &nodes,
        &credential,
        |index, package| {
            let line = format!(
                "Installing package {} ({}) on node(s) {}",
                index,
                style(package).bold(),
                style(&nodes).cyan()
            );
            match format {
                OutputFormat::Table => println!("{line}"),
                OutputFormat::Json => eprintln!("{line}"),
            }
        },
    );

    match format {
        OutputFormat::Table => output::print_table(&report),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(if report.is_success() { 0 } else { EXIT_INSTALL_FAILED })
}

fn read_credential(arg: &str) -> Result<Credential> {
    if arg != "-" {
        return Ok(Credential::new(arg));
    }
    let secret = Password::new()
        .with_prompt("sudo password on the nodes")
        .allow_empty_password(true)
        .interact()?;
    Ok(Credential::new(secret))
}
