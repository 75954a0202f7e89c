use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vault-issuer")]
#[command(version)]
#[command(about = "Sign certificate requests with Vault PKI issuers")]
#[command(long_about = None)]
pub struct Cli {
    /// Config file path (defaults to ~/.config/vault-issuer/config.yaml)
    #[arg(long, env = "VAULT_ISSUER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more verbosity: -v INFO, -vv DEBUG, -vvv TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output raw tab-separated values (no formatting)
    #[arg(short, long)]
    pub raw: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single signing pass for one request file
    Process {
        /// Request file (YAML)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        request: PathBuf,

        /// Write tls.crt and ca.crt below this directory instead of the configured one
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        out: Option<PathBuf>,

        /// Inventory of issuers and secrets (overrides config)
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        inventory: Option<PathBuf>,

        /// Deadline for the pass in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Continuously process all requests in a directory
    Run {
        /// Directory with request files (overrides config)
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        requests_dir: Option<PathBuf>,

        /// Output directory for issued certificates (overrides config)
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        output_dir: Option<PathBuf>,

        /// Inventory of issuers and secrets (overrides config)
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        inventory: Option<PathBuf>,

        /// Number of concurrent workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Check that a request file contains a decodable CSR
    Validate {
        /// Request file (YAML)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        request: PathBuf,
    },
    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
