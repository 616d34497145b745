//! Filestore Server

mod args;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use filestore_server::admission::AdmissionController;
use filestore_server::config::Config;
use filestore_server::connection::{self, ConnectionParams};
use filestore_server::service::FileService;
use filestore_server::storage::FileStore;
use filestore_server::transfers::TransferSettings;

use args::Args;

/// Time in-flight connections get to report cancellation before being aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting filestored");

    let config = load_config(&args);
    let store = setup_storage(&config).await;

    let admission = Arc::new(AdmissionController::new(config.admission_limits()));
    let settings = TransferSettings {
        chunk_size: config.chunk_size,
        ..TransferSettings::default()
    };
    let service = Arc::new(FileService::new(Arc::clone(&admission), store, settings));

    let addr = config.listen_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    tracing::info!(
        %addr,
        create_limit = config.create_limit,
        get_limit = config.get_limit,
        list_limit = config.list_limit,
        timeout = ?config.timeout,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    tokio::select! {
        () = setup_shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
        () = accept_loop(&listener, &service, config.timeout, &shutdown_rx, &mut connections) => {}
    }

    // Cancel in-flight calls and refuse new permits
    shutdown_tx.send_replace(true);
    admission.close();
    drop(listener);

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = connections.len(),
            "aborting connections still open after grace period"
        );
        connections.shutdown().await;
    }

    tracing::info!("server stopped");
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` with `--debug`.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load the config file and apply command-line overrides
fn load_config(args: &Args) -> Config {
    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %args.config.display(), error = %e, "failed to load config");
            process::exit(1);
        }
    };

    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        process::exit(1);
    }

    config
}

/// Create the storage root and staging directory
async fn setup_storage(config: &Config) -> FileStore {
    let store = FileStore::new(&config.storage_path, config.staging_dir());
    if let Err(e) = store.init().await {
        tracing::error!(error = %e, "failed to initialise storage");
        process::exit(1);
    }

    tracing::info!(
        root = %store.root().display(),
        staging = %store.staging_dir().display(),
        "storage ready"
    );
    store
}

/// Accept connections until the surrounding future is dropped
async fn accept_loop(
    listener: &TcpListener,
    service: &Arc<FileService>,
    call_timeout: Duration,
    shutdown: &watch::Receiver<bool>,
    connections: &mut JoinSet<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer_addr)) => {
                    let params = ConnectionParams {
                        peer_addr,
                        service: Arc::clone(service),
                        call_timeout,
                        shutdown: shutdown.clone(),
                    };
                    connections.spawn(async move {
                        if let Err(e) = connection::handle_connection(socket, params).await {
                            tracing::debug!(peer = %peer_addr, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!(error = %e, "connection task panicked");
                    }
                }
            }
        }
    }
}

/// Resolve on SIGTERM or SIGINT (Ctrl+C elsewhere)
async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    }
}
