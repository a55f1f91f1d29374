use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zonekeep::answer::{AnswerEngine, format_error_response};
use zonekeep::config::ServerConfig;
use zonekeep::dns::enums::ResponseCode;
use zonekeep::dns::header::DNSHeader;
use zonekeep::message::Outbox;
use zonekeep::store::{self, Store};
use zonekeep::zone::{SyncOutcome, ZoneSync};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn cli() -> Command {
    let common = [
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("TOML configuration file (default: ZONEKEEP_* environment)")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("path")
            .short('p')
            .long("path")
            .value_name("PATH")
            .help("Zone file or directory of *.zone files")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("backend")
            .short('b')
            .long("backend")
            .value_name("ID")
            .help("Store backend"),
    ];

    Command::new("zonekeep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Authoritative DNS answers from synchronized zone files")
        .subcommand_required(true)
        .subcommand(
            Command::new("sync")
                .about("Synchronize zone files into the store once")
                .args(common.clone()),
        )
        .subcommand(
            Command::new("serve")
                .about("Synchronize zone files and answer queries over UDP")
                .args(common)
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_name("ADDRESS:PORT")
                        .help("Address to answer queries on")
                        .value_parser(clap::value_parser!(std::net::SocketAddr)),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<ServerConfig, BoxError> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(file) => ServerConfig::from_file(file)?,
        None => ServerConfig::from_env()?,
    };
    if let Some(path) = matches.get_one::<PathBuf>("path") {
        config.path = path.clone();
    }
    if let Some(backend) = matches.get_one::<String>("backend") {
        config.backend = backend.clone();
    }
    if let Ok(Some(bind)) = matches.try_get_one::<std::net::SocketAddr>("bind") {
        config.bind_addr = *bind;
    }
    config.validate()?;
    Ok(config)
}

/// Run one pass over the zone files; returns the number that failed
fn sync_all(store: &dyn Store, path: &Path, stop: &AtomicBool) -> Result<usize, BoxError> {
    let results = ZoneSync::new(store).sync_dir(path, stop)?;
    let mut failed = 0;
    for (file, result) in &results {
        match result {
            Ok(report) if report.outcome == SyncOutcome::Unchanged => {}
            Ok(report) => info!(
                "{}: zone {} serial {} ({} written, {} removed)",
                file.display(),
                report.zone,
                report.serial,
                report.updated,
                report.removed
            ),
            Err(_) => failed += 1,
        }
    }
    info!(
        "Synced {} zone files from {}, {} failed",
        results.len(),
        path.display(),
        failed
    );
    Ok(failed)
}

async fn serve(
    config: ServerConfig,
    store: Arc<dyn Store>,
    stop: Arc<AtomicBool>,
) -> Result<(), BoxError> {
    if let Some(interval) = config.sync_interval() {
        let store = Arc::clone(&store);
        let path = config.path.clone();
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; startup already synced.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let store = Arc::clone(&store);
                let path = path.clone();
                let stop = Arc::clone(&stop);
                let pass =
                    tokio::task::spawn_blocking(move || sync_all(store.as_ref(), &path, &stop))
                        .await;
                match pass {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Zone resync failed: {}", e),
                    Err(e) => warn!("Zone resync task failed: {}", e),
                }
            }
        });
    }

    let engine = AnswerEngine::new(store, config.max_udp_payload as usize);
    let mut ctx = engine.context();
    let mut outbox = Outbox::new();

    let socket = UdpSocket::bind(config.bind_addr).await?;
    info!("Listening on {}", socket.local_addr()?);

    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (read_bytes, peer) = received?;
                let packet = &buf[..read_bytes];
                if let Err(e) = engine.handle(&mut ctx, packet, peer, &mut outbox) {
                    warn!("Failed to answer query from {}: {}", peer, e);
                    if let Ok(header) = DNSHeader::parse(packet) {
                        if let Ok(response) =
                            format_error_response(&header, ResponseCode::ServerFailure)
                        {
                            outbox.messages.push((peer, response));
                        }
                    }
                }
                for (peer, message) in outbox.drain() {
                    if let Err(e) = socket.send_to(&message, peer).await {
                        warn!("Failed to send response to {}: {}", peer, e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                stop.store(true, Ordering::Relaxed);
                return Ok(());
            }
        }
    }
}

async fn run() -> Result<(), BoxError> {
    let matches = cli().get_matches();
    let Some((command, sub)) = matches.subcommand() else {
        return Err("no subcommand given".into());
    };

    let config = load_config(sub)?;
    let store = store::open(&config.backend)?;
    info!(
        "Using {} store, zones from {}",
        store.backend(),
        config.path.display()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let failed = {
        let store = Arc::clone(&store);
        let path = config.path.clone();
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || sync_all(store.as_ref(), &path, &stop)).await??
    };

    match command {
        "sync" if failed > 0 => Err(format!("{} zone files failed to sync", failed).into()),
        "sync" => Ok(()),
        _ => serve(config, store, stop).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
