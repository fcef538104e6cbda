// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outpost: operator tooling for a self-hosted VPN deployment

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use outpost::certs::{CertManager, LifecycleReport};
use outpost::compose::ProcessRunner;
use outpost::config::DEFAULT_CONFIG_TOML;
use outpost::descriptor::{self, Credentials, DescriptorSet, Engine, EngineAction};
use outpost::storage::{self, ObjectStorage, ObjectStorageClient, ObjectUrlRequest, SslMaterial};
use outpost::{Config, OutpostError};

/// Outpost: VPN deployment operator tool
///
/// Validates and hands infrastructure descriptors to the reconciliation
/// engine, and manages the VPN's client certificates.
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "outpost.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Dry run mode (print commands, no side effects)
    #[arg(long)]
    dry_run: bool,

    /// Stop at the first failed container command
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the server configuration and initialise the PKI
    InitPki,

    /// Issue a client certificate and export its .ovpn file
    CreateClient {
        /// Client name
        name: Option<String>,
    },

    /// Revoke a client certificate and remove its .ovpn file
    RevokeClient {
        /// Client name
        name: Option<String>,
    },

    /// Validate a descriptor set
    Validate {
        /// Descriptor file or directory (defaults to engine.descriptors)
        path: Option<PathBuf>,
    },

    /// Print the order declarations are applied in
    Order {
        /// Descriptor file or directory
        path: Option<PathBuf>,
    },

    /// Render a descriptor set as engine configuration (tokens redacted)
    Render {
        /// Descriptor file or directory
        path: Option<PathBuf>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render and run the engine's plan
    Plan {
        /// Descriptor file or directory
        path: Option<PathBuf>,
    },

    /// Render and run the engine's apply
    Apply {
        /// Descriptor file or directory
        path: Option<PathBuf>,

        /// Skip the engine's confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },

    /// Render and run the engine's destroy
    Destroy {
        /// Descriptor file or directory
        path: Option<PathBuf>,

        /// Skip the engine's confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },

    /// Object-storage bucket operations
    #[command(subcommand)]
    Bucket(BucketCommands),

    /// Show configuration
    Config,

    /// Initialize a new outpost configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum BucketCommands {
    /// Whether the bucket serves a custom certificate
    SslStatus {
        #[command(flatten)]
        target: BucketTarget,
    },

    /// Replace the bucket's certificate
    SslRotate {
        #[command(flatten)]
        target: BucketTarget,

        /// PEM certificate chain
        #[arg(long)]
        cert: PathBuf,

        /// PEM private key
        #[arg(long)]
        key: PathBuf,
    },

    /// Obtain a certificate from the ACME directory and install it
    SslIssue {
        #[command(flatten)]
        target: BucketTarget,

        /// Domain to certify (defaults to acme.domain, then the bucket hostname)
        #[arg(long)]
        domain: Option<String>,
    },

    /// Remove the bucket's certificate
    SslRemove {
        #[command(flatten)]
        target: BucketTarget,
    },

    /// Create a presigned URL for one object
    ObjectUrl {
        #[command(flatten)]
        target: BucketTarget,

        /// Object name
        name: String,

        /// HTTP method the URL is valid for
        #[arg(long, default_value = "GET")]
        method: String,

        /// Content type for PUT URLs
        #[arg(long)]
        content_type: Option<String>,

        /// Lifetime in seconds
        #[arg(long)]
        expires_in: Option<u32>,
    },

    /// Set an object's ACL
    ObjectAcl {
        #[command(flatten)]
        target: BucketTarget,

        /// Object name
        name: String,

        /// ACL (private, public-read, ...)
        acl: String,
    },
}

#[derive(clap::Args, Debug)]
struct BucketTarget {
    /// Cluster (defaults to storage.cluster)
    #[arg(long)]
    cluster: Option<String>,

    /// Bucket label (defaults to storage.bucket)
    #[arg(long)]
    bucket: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    // Logging goes to stderr; stdout carries command output
    let directive = log_directive(
        &cli,
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        config.as_ref().ok().map(|c| c.logging.level.as_str()),
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match error.downcast_ref::<OutpostError>() {
                Some(usage) if usage.is_usage() => println!("{}", usage),
                _ => eprintln!("Error: {:#}", error),
            }
            ExitCode::FAILURE
        }
    }
}

/// Filter directive: `--debug`, then `--verbose`, then `RUST_LOG`, then `logging.level`
fn log_directive(cli: &Cli, env: Option<String>, configured: Option<&str>) -> String {
    if cli.debug {
        return "debug".to_string();
    }
    if cli.verbose {
        return "info".to_string();
    }
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| "warn".to_string())
}

async fn run(cli: Cli, config: outpost::Result<Config>) -> anyhow::Result<()> {
    match cli.command {
        Commands::Version => {
            println!("Outpost v{}", env!("CARGO_PKG_VERSION"));
            println!("VPN deployment operator tool");
            Ok(())
        }

        Commands::Init { force } => init_config(&cli.config, force),

        Commands::Config => show_config(&cli.config, config?),

        Commands::InitPki => {
            let config = config?;
            let runner = ProcessRunner::new(cli.dry_run);
            let manager = CertManager::new(&config, &runner)
                .strict(cli.strict || config.strict)
                .dry_run(cli.dry_run);
            let report = manager.init_pki().await?;
            print_report("PKI initialised", &report, cli.dry_run);
            Ok(())
        }

        Commands::CreateClient { name } => {
            let config = config?;
            let runner = ProcessRunner::new(cli.dry_run);
            let manager = CertManager::new(&config, &runner)
                .strict(cli.strict || config.strict)
                .dry_run(cli.dry_run);
            let report = manager.create_client(name.as_deref()).await?;
            print_report("Client created", &report, cli.dry_run);
            Ok(())
        }

        Commands::RevokeClient { name } => {
            let config = config?;
            let runner = ProcessRunner::new(cli.dry_run);
            let manager = CertManager::new(&config, &runner)
                .strict(cli.strict || config.strict)
                .dry_run(cli.dry_run);
            let report = manager.revoke_client(name.as_deref()).await?;
            print_report("Client revoked", &report, cli.dry_run);
            Ok(())
        }

        Commands::Validate { path } => {
            let config = config?;
            let (path, set) = load_descriptors(&config, path)?;
            set.validate()
                .with_context(|| format!("Descriptor set {} is invalid", path.display()))?;

            println!("Descriptor set '{}' is valid", path.display());
            println!();
            println!("  Providers: {}", set.providers.len());
            println!("  Declarations: {}", set.declarations.len());
            Ok(())
        }

        Commands::Order { path } => {
            let config = config?;
            let (_, set) = load_descriptors(&config, path)?;
            for (index, address) in set.application_order()?.iter().enumerate() {
                println!("{:>3}. {}", index + 1, address);
            }
            Ok(())
        }

        Commands::Render { path, out } => {
            let config = config?;
            let (_, set) = load_descriptors(&config, path)?;
            let document = descriptor::render(&set, &Credentials::redacted(&set))?;
            let text = serde_json::to_string_pretty(&document)?;

            match out {
                Some(out) => {
                    std::fs::write(&out, text)
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    println!("Rendered configuration written to {}", out.display());
                }
                None => println!("{}", text),
            }
            Ok(())
        }

        Commands::Plan { path } => run_engine(config?, path, EngineAction::Plan, false, cli.dry_run).await,

        Commands::Apply { path, auto_approve } => {
            run_engine(config?, path, EngineAction::Apply, auto_approve, cli.dry_run).await
        }

        Commands::Destroy { path, auto_approve } => {
            run_engine(config?, path, EngineAction::Destroy, auto_approve, cli.dry_run).await
        }

        Commands::Bucket(command) => run_bucket(config?, command).await,
    }
}

/// Initialize a new configuration file
fn init_config(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(config_path, DEFAULT_CONFIG_TOML)?;
    info!("Created configuration file: {}", config_path.display());
    println!("Created configuration file: {}", config_path.display());
    Ok(())
}

/// Show the effective configuration
fn show_config(config_path: &Path, config: Config) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("No configuration file found. Using defaults:");
        println!();
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_report(done: &str, report: &LifecycleReport, dry_run: bool) {
    if dry_run {
        for command in &report.commands {
            println!("[DRY RUN] Would execute: {}", command);
        }
        return;
    }

    if let Some(artifact) = &report.artifact {
        println!("{}: {}", done, artifact.display());
    } else {
        println!("{}", done);
    }

    if !report.success() {
        warn!(failed = report.commands_failed, "Some commands failed");
        println!(
            "Completed with {} failed command(s) of {}",
            report.commands_failed,
            report.commands.len()
        );
    }
}

fn load_descriptors(config: &Config, path: Option<PathBuf>) -> anyhow::Result<(PathBuf, DescriptorSet)> {
    let path = path.unwrap_or_else(|| config.engine.descriptors.clone());
    info!("Loading descriptors: {}", path.display());

    let set = DescriptorSet::load(&path)
        .with_context(|| format!("Failed to load descriptors from {}", path.display()))?;
    Ok((path, set))
}

async fn run_engine(
    config: Config,
    path: Option<PathBuf>,
    action: EngineAction,
    auto_approve: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let (_, set) = load_descriptors(&config, path)?;
    let credentials = if dry_run {
        Credentials::redacted(&set)
    } else {
        Credentials::from_env(&set)?
    };

    let runner = ProcessRunner::new(dry_run);
    let engine = Engine::new(&config.engine, &runner)
        .auto_approve(auto_approve)
        .dry_run(dry_run);
    let commands = engine.run(action, &set, &credentials).await?;

    if dry_run {
        for command in &commands {
            println!("[DRY RUN] Would execute: {}", command);
        }
    } else {
        println!("Engine {} completed", action);
    }
    Ok(())
}

fn bucket_target(config: &Config, target: BucketTarget) -> anyhow::Result<(String, String)> {
    let cluster = target.cluster.or_else(|| config.storage.cluster.clone());
    let bucket = target.bucket.or_else(|| config.storage.bucket.clone());

    match (cluster, bucket) {
        (Some(cluster), Some(bucket)) => Ok((cluster, bucket)),
        _ => Err(OutpostError::MissingConfiguration {
            message: "bucket cluster and label are required (--cluster/--bucket or [storage])"
                .to_string(),
        }
        .into()),
    }
}

async fn run_bucket(config: Config, command: BucketCommands) -> anyhow::Result<()> {
    match command {
        BucketCommands::SslStatus { target } => {
            let (cluster, bucket) = bucket_target(&config, target)?;
            let client = ObjectStorageClient::from_config(&config.storage)?;
            let enabled = client.ssl_status(&cluster, &bucket).await?;
            println!(
                "{}/{}: {}",
                cluster,
                bucket,
                if enabled { "custom certificate installed" } else { "no custom certificate" }
            );
        }

        BucketCommands::SslRotate { target, cert, key } => {
            let (cluster, bucket) = bucket_target(&config, target)?;
            let material = SslMaterial::from_files(&cert, &key)
                .with_context(|| format!("Failed to read {} / {}", cert.display(), key.display()))?;
            let client = ObjectStorageClient::from_config(&config.storage)?;
            storage::rotate_ssl(&client, &cluster, &bucket, &material).await?;
            println!("Certificate rotated for {}/{}", cluster, bucket);
        }

        BucketCommands::SslIssue { target, domain } => {
            let (cluster, bucket) = bucket_target(&config, target)?;
            let client = ObjectStorageClient::from_config(&config.storage)?;
            let domain = match domain.or_else(|| config.acme.domain.clone()) {
                Some(domain) => domain,
                None => bucket_hostname(&client, &cluster, &bucket).await?,
            };

            let material = storage::issue_certificate(&client, &config.acme, &cluster, &bucket, &domain)
                .await
                .with_context(|| format!("Failed to issue a certificate for {}", domain))?;
            storage::rotate_ssl(&client, &cluster, &bucket, &material).await?;
            println!("Certificate for {} installed on {}/{}", domain, cluster, bucket);
        }

        BucketCommands::SslRemove { target } => {
            let (cluster, bucket) = bucket_target(&config, target)?;
            let client = ObjectStorageClient::from_config(&config.storage)?;
            storage::ensure_bucket(&client, &cluster, &bucket).await?;
            client.delete_ssl(&cluster, &bucket).await?;
            println!("Certificate removed from {}/{}", cluster, bucket);
        }

        BucketCommands::ObjectUrl {
            target,
            name,
            method,
            content_type,
            expires_in,
        } => {
            let (cluster, bucket) = bucket_target(&config, target)?;
            let client = ObjectStorageClient::from_config(&config.storage)?;
            let request = ObjectUrlRequest {
                name: &name,
                method: &method,
                content_type: content_type.as_deref(),
                expires_in,
            };
            println!("{}", client.create_object_url(&cluster, &bucket, &request).await?);
        }

        BucketCommands::ObjectAcl { target, name, acl } => {
            let (cluster, bucket) = bucket_target(&config, target)?;
            let client = ObjectStorageClient::from_config(&config.storage)?;
            client.update_object_acl(&cluster, &bucket, &name, &acl).await?;
            println!("ACL of {} set to {}", name, acl);
        }
    }
    Ok(())
}

async fn bucket_hostname(client: &ObjectStorageClient, cluster: &str, bucket: &str) -> anyhow::Result<String> {
    client
        .buckets()
        .await?
        .into_iter()
        .find(|b| b.cluster == cluster && b.label == bucket)
        .and_then(|b| b.hostname)
        .ok_or_else(|| {
            OutpostError::MissingConfiguration {
                message: "no domain given (--domain or acme.domain) and the bucket has no hostname"
                    .to_string(),
            }
            .into()
        })
}
