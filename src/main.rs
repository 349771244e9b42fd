use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use doorstep::auth::PasswordGate;
use doorstep::notify::NotifyHub;
use doorstep::scheduler::Scheduler;
use doorstep::{compactor, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("DOORSTEP_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    doorstep::observability::init(metrics_port);

    let port = std::env::var("DOORSTEP_PORT").unwrap_or_else(|_| "4747".into());
    let bind = std::env::var("DOORSTEP_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("DOORSTEP_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("DOORSTEP_PASSWORD").ok();
    let max_connections: usize = std::env::var("DOORSTEP_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("DOORSTEP_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let tls_cert = std::env::var("DOORSTEP_TLS_CERT").ok();
    let tls_key = std::env::var("DOORSTEP_TLS_KEY").ok();
    let tls_acceptor = doorstep::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    std::fs::create_dir_all(&data_dir)?;
    let journal_path = PathBuf::from(&data_dir).join("doorstep.journal");

    let gate = PasswordGate::new(password);
    let notify = Arc::new(NotifyHub::new());
    let scheduler = Arc::new(Scheduler::open(journal_path, notify)?);

    let compactor_scheduler = scheduler.clone();
    tokio::spawn(async move {
        compactor::run_compactor(compactor_scheduler, compact_threshold).await;
    });

    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("doorstep listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!("  auth: {}", if gate.required() { "password" } else { "open" });
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(doorstep::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(doorstep::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(doorstep::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let scheduler = scheduler.clone();
                let gate = gate.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    let result = match tls {
                        Some(acceptor) => match acceptor.accept(socket).await {
                            Ok(stream) => wire::process_connection(stream, scheduler, gate).await,
                            Err(e) => {
                                tracing::error!("tls handshake failed from {peer}: {e}");
                                Ok(())
                            }
                        },
                        None => wire::process_connection(socket, scheduler, gate).await,
                    };
                    if let Err(e) = result {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(doorstep::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("doorstep stopped");
    Ok(())
}
