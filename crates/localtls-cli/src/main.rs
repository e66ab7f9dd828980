use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use localtls::Algorithm;
use snafu::{ResultExt, Snafu};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

mod generate;
mod inspect;
mod provision;

/// The environment variable holding the log filter directives.
const LOG_ENV_VAR: &str = "LOCALTLS_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to provision cached credentials"))]
    Provision { source: provision::Error },

    #[snafu(display("failed to generate credentials"))]
    Generate { source: generate::Error },

    #[snafu(display("failed to inspect PEM file"))]
    Inspect { source: inspect::Error },
}

/// Creates self-signed CAs and TLS server certificates for local development.
#[derive(Debug, Parser)]
#[command(name = "localtls", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reads the cached credentials of an application, creating them on first use.
    Provision(provision::ProvisionArguments),

    /// Creates fresh credentials and prints them without touching the cache.
    Generate(CredentialArguments),

    /// Prints what a PEM file contains.
    Inspect {
        /// The PEM file to inspect.
        file: PathBuf,
    },
}

/// Arguments shared by all subcommands which create credentials.
#[derive(Debug, Args)]
struct CredentialArguments {
    /// The key algorithm, one of ed25519, rsa or ecdsa.
    #[arg(long, short, env = "LOCALTLS_ALGORITHM", default_value_t = Algorithm::Ed25519)]
    algorithm: Algorithm,

    /// The common name of the CA. Defaults to the short hostname, followed by
    /// "ca-" and the current date.
    #[arg(long, env = "LOCALTLS_CANONICAL_NAME", default_value = "")]
    canonical_name: String,

    /// IP addresses and DNS names the server certificate is issued for.
    /// Defaults to 127.0.0.1, ::1 and localhost.
    #[arg(value_name = "IP_OR_DOMAIN")]
    ips_and_domains: Vec<String>,
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    initialize_logging();

    match cli.command {
        Command::Provision(arguments) => provision::run(&arguments).context(ProvisionSnafu),
        Command::Generate(arguments) => generate::run(&arguments).context(GenerateSnafu),
        Command::Inspect { file } => inspect::run(&file).context(InspectSnafu),
    }
}

/// Installs a console subscriber writing to stderr, so that stdout only
/// carries the command output.
fn initialize_logging() {
    let env_filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    Registry::default().with(console_layer).init();
}
