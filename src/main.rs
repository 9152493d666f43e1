use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use polyhub::infrastructure::LoggingEventHandler;
use polyhub::protocol::{generate_pairing_link, parse_pairing_link};
use polyhub::utils::format_size;
use polyhub::{AppConfig, PeerAddress, PeerTransport, SharedFile, TransportError};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for pairing requests, control messages and incoming files
    Serve {
        /// Where received files are written
        #[arg(short, long)]
        sync_folder: Option<PathBuf>,

        /// Aggregate size limit for the sync folder in bytes, 0 for unlimited
        #[arg(long)]
        max_storage: Option<u64>,

        /// Per-file size limit in bytes, 0 for unlimited
        #[arg(long)]
        max_file: Option<u64>,
    },
    /// Ask a peer to pair with this machine
    Pair {
        /// Overlay address of the peer
        host: String,
    },
    /// Send a file to a peer
    Send {
        host: String,

        /// Path to the file to send
        file: PathBuf,

        /// Place the file under this path in the peer's sync folder
        #[arg(short, long)]
        relative_path: Option<String>,
    },
    /// Tell a peer a shared file was deleted
    Delete { host: String, file_id: String },
    /// Push the configured profile to one or more peers
    Profile {
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Create or decode pairing links
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },
}

#[derive(Subcommand)]
enum LinkAction {
    /// Print a link for the configured profile
    Generate,
    /// Decode a link
    Parse { link: String },
}

// Function to initialize tracing and file logging
// Returns a WorkerGuard that must be kept alive for logs to be written
fn init_logging(log_file_prefix: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", log_file_prefix);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false); // Don't use ANSI codes in files

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    // Use RUST_LOG env var, default to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // This guard needs to stay in scope, otherwise logs stop writing.
    let _guard = init_logging("polyhub")?;

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());
    config.validate().context("invalid configuration")?;

    let transport = PeerTransport::new(config.transport_config()?);
    config.apply_to(&transport);
    let peer = |host: String| {
        PeerAddress::with_ports(host, config.network.control_port, config.network.transfer_port)
    };

    match cli.command {
        Commands::Serve {
            sync_folder,
            max_storage,
            max_file,
        } => {
            if sync_folder.is_some() {
                transport.set_sync_folder(sync_folder);
            }
            if max_storage.is_some() || max_file.is_some() {
                let policy = transport.quota().policy();
                transport.set_storage_limits(
                    max_storage.or(policy.max_storage_bytes),
                    max_file.or(policy.max_file_bytes),
                );
            }
            if let Some(folder) = transport.quota().sync_folder() {
                std::fs::create_dir_all(&folder)
                    .with_context(|| format!("cannot create sync folder {}", folder.display()))?;
            }

            let _logger = transport.events().attach(Arc::new(LoggingEventHandler));
            let handle = transport.start().await?;
            println!(
                "Listening: control {} transfer {}",
                handle.control_addr(),
                handle.transfer_addr()
            );

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            handle.stop().await;
        }
        Commands::Pair { host } => {
            let target = peer(host);
            transport.send_pair_request(&target, &config.profile).await?;
            println!("Paired with {}", target);
        }
        Commands::Send {
            host,
            file,
            relative_path,
        } => {
            let target = peer(host);
            let mut shared = SharedFile::from_path(&file);
            shared.shared_by = Some(config.profile.name.clone());
            shared.relative_path = relative_path;

            let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?,
            );

            let bar = pb.clone();
            let task = transport.send_file(&target, shared, &config.profile, move |progress| {
                bar.set_position(progress.bytes_sent);
            });
            let controller = task.controller();

            let result = tokio::select! {
                result = task.wait() => result,
                _ = tokio::signal::ctrl_c() => {
                    controller.cancel();
                    Err(TransportError::Cancelled)
                }
            };

            match result {
                Ok(()) => {
                    pb.finish_with_message("done");
                    println!("Sent {} ({}) to {}", file.display(), format_size(size), target);
                }
                Err(e) if e.is_cancelled() => {
                    pb.abandon();
                    warn!("Transfer cancelled");
                }
                Err(e) => {
                    pb.abandon();
                    error!("Transfer failed: {}", e);
                    bail!(e);
                }
            }
        }
        Commands::Delete { host, file_id } => {
            let target = peer(host);
            transport
                .announce_file_delete(&target, &file_id, &config.profile)
                .await?;
            println!("Delete of {} announced to {}", file_id, target);
        }
        Commands::Profile { hosts } => {
            let peers: Vec<PeerAddress> = hosts.into_iter().map(peer).collect();
            let mut failures = 0;
            for (target, result) in transport.broadcast_profile_update(&peers, &config.profile).await {
                match result {
                    Ok(()) => println!("{}: updated", target),
                    Err(e) => {
                        failures += 1;
                        println!("{}: {}", target, e);
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} peers could not be updated", failures, peers.len());
            }
        }
        Commands::Link { action } => match action {
            LinkAction::Generate => println!("{}", generate_pairing_link(&config.profile)),
            LinkAction::Parse { link } => match parse_pairing_link(&link) {
                Some(invite) => println!(
                    "{}",
                    serde_json::to_string_pretty(&invite).context("cannot render invite")?
                ),
                None => bail!("not a valid pairing link"),
            },
        },
    }

    Ok(())
}
