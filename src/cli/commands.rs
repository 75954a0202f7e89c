use crate::cli::args::*;
use crate::config::Config;
use crate::controller::{CertificateRequestSigner, StatusBoard};
use crate::inventory::FileInventory;
use crate::request::decode_csr;
use crate::scheduler::{
    load_request, process_with_deadline, Controller, ControllerOptions, RequestDirectory,
    WorkQueue,
};
use crate::utils::errors::{Result, VaultIssuerError};
use crate::utils::output::{phase_row, write_issue_result, OutputFormat};
use crate::utils::paths::VaultIssuerPaths;
use crate::vault::VaultBackendFactory;
use clap::CommandFactory;
use clap_complete::generate;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn handle_command(cli: Cli) -> Result<()> {
    // Initialize logging - always to stderr
    if !cli.quiet {
        let log_level = match cli.verbose {
            0 => "vault_issuer=warn",  // Default: warnings only
            1 => "vault_issuer=info",  // -v: info level
            2 => "vault_issuer=debug", // -vv: debug level
            _ => "vault_issuer=trace", // -vvv+: trace level
        };

        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(log_level)
            .init();
    }

    let output = OutputFormat::new(cli.raw);

    match cli.command {
        Commands::Process {
            ref request,
            ref out,
            ref inventory,
            timeout,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(inventory) = inventory {
                config.inventory = inventory.clone();
            }
            if let Some(timeout) = timeout {
                config.sign_timeout = Duration::from_secs(timeout.max(1));
            }
            let out = out.clone().unwrap_or_else(|| config.output_dir.clone());
            process_command(&config, request, &out, &output).await
        }
        Commands::Run {
            ref requests_dir,
            ref output_dir,
            ref inventory,
            workers,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(dir) = requests_dir {
                config.requests_dir = dir.clone();
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir.clone();
            }
            if let Some(inventory) = inventory {
                config.inventory = inventory.clone();
            }
            if let Some(workers) = workers {
                config.workers = workers.max(1);
            }
            run_command(config, &output).await
        }
        Commands::Validate { ref request } => validate_command(request, &output),
        Commands::Completion { shell } => {
            generate(shell, &mut Cli::command(), "vault-issuer", &mut io::stdout());
            Ok(())
        }
    }
}

fn build_signer(
    config: &Config,
    inventory: Arc<FileInventory>,
    status: Arc<StatusBoard>,
) -> CertificateRequestSigner {
    CertificateRequestSigner::new(
        inventory.clone(),
        inventory,
        Arc::new(VaultBackendFactory),
        status,
    )
    .with_cluster_resource_namespace(config.cluster_resource_namespace.clone())
}

fn load_inventory(path: &Path) -> Arc<FileInventory> {
    let inventory = FileInventory::new(path);
    // Lookups against an unloaded inventory fail as transient errors
    if let Err(e) = inventory.reload() {
        tracing::warn!("{e}");
    }
    Arc::new(inventory)
}

async fn process_command(
    config: &Config,
    request_file: &Path,
    out: &Path,
    output: &OutputFormat,
) -> Result<()> {
    let request = load_request(request_file)?;
    let inventory = load_inventory(&config.inventory);
    let status = Arc::new(StatusBoard::new());
    let signer = build_signer(config, inventory, status.clone());

    let shutdown = CancellationToken::new();
    let result = process_with_deadline(&signer, &request, config.sign_timeout, &shutdown).await;

    let key = request.key();
    if let Some(phase) = status.phase(&key) {
        output.print_table(&[phase_row(&key, &phase)]);
    }

    match result {
        Ok(Some(issued)) => {
            let dir = write_issue_result(out, &key, &issued)?;
            eprintln!("✓ Certificate written to: {}", dir.display());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(VaultIssuerError::Requeue(e)),
    }
}

async fn run_command(config: Config, output: &OutputFormat) -> Result<()> {
    if !config.requests_dir.is_dir() {
        return Err(VaultIssuerError::Config(format!(
            "Requests directory '{}' does not exist",
            config.requests_dir.display()
        )));
    }
    VaultIssuerPaths::ensure_dir_exists(&config.output_dir)?;

    let inventory = load_inventory(&config.inventory);
    let status = Arc::new(StatusBoard::new());
    let signer = Arc::new(build_signer(&config, inventory.clone(), status.clone()));

    let controller = Arc::new(Controller::new(
        signer,
        Arc::new(RequestDirectory::new(&config.requests_dir)),
        inventory,
        status.clone(),
        WorkQueue::new(config.backoff()),
        ControllerOptions {
            workers: config.workers,
            sign_timeout: config.sign_timeout,
            resync_interval: config.resync_interval,
            output_dir: config.output_dir.clone(),
        },
    ));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
        signal.cancel();
    });

    controller.run(shutdown).await?;

    let rows: Vec<_> = status
        .snapshot()
        .iter()
        .map(|(key, phase)| phase_row(key, phase))
        .collect();
    output.print_table(&rows);
    Ok(())
}

fn validate_command(request_file: &Path, output: &OutputFormat) -> Result<()> {
    let request = load_request(request_file)?;
    let csr = decode_csr(&request.csr)
        .map_err(|e| VaultIssuerError::InvalidInput(format!("Failed to decode CSR: {e}")))?;

    let ip_addresses = csr
        .ip_addresses
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>();

    output.print_key_value(&[
        ("Request", request.key().to_string()),
        ("Issuer", request.issuer_ref.name.clone()),
        ("Kind", request.issuer_ref.display_kind().to_string()),
        ("Common Name", csr.common_name),
        ("DNS Names", csr.dns_names.join(",")),
        ("IP Addresses", ip_addresses.join(",")),
        ("URIs", csr.uris.join(",")),
        ("Duration", format!("{}s", request.duration.as_secs())),
    ]);
    Ok(())
}
