mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use finp2p_authority::PrimaryRouterAuthority;
use finp2p_common::crypto::RouterSigner;
use finp2p_confirmation::{ConfirmationRecordStore, ParallelConfirmationProcessor, ProcessorConfig};
use finp2p_ledger::{LedgerManager, MockAdapter};
use finp2p_router::{AdminState, RouterConfig, RouterCore};
use finp2p_store::Store;
use finp2p_transfer::TransferManager;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use cli::Args;
use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    install_panic_hook();

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(router_id) = args.router_id {
        config.router_id = router_id;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    init_logging(&config.router_id, &config.monitoring.log_level);
    info!(router_id = %config.router_id, "starting finp2p router");

    let signer = load_or_generate_signer(&args.keypair_path)?;
    let redis_url = if config.redis.url.is_empty() { None } else { Some(config.redis.url.as_str()) };
    let store = Store::new(redis_url)?;

    let authority = Arc::new(PrimaryRouterAuthority::new(store.clone(), config.router_id.clone()));

    let ledger = Arc::new(LedgerManager::new(config.reservation_timeout_ms / 1000));
    for (ledger_id, ledger_config) in &config.ledgers {
        if ledger_config.ledger_type == "mock" {
            ledger.register_adapter(Arc::new(MockAdapter::new(ledger_id.clone()))).await;
        } else {
            info!(ledger_id, ledger_type = %ledger_config.ledger_type, "no adapter implementation available for this ledger type, skipping");
        }
    }

    let confirmation_store = Arc::new(ConfirmationRecordStore::new(store.clone(), config.router_id.clone(), signer.clone()));
    let processor_config = ProcessorConfig {
        max_concurrency: config.confirmation.max_concurrency,
        batch_size: config.confirmation.batch_size,
        default_max_retries: 3,
        processing_timeout_ms: config.confirmation.processing_timeout_ms,
    };
    let processor = Arc::new(ParallelConfirmationProcessor::new(confirmation_store, processor_config));

    let transfer_manager = Arc::new(
        TransferManager::new(config.router_id.clone(), ledger.clone())
            .with_confirmation_processor(processor.clone())
            .with_event_store(store.clone()),
    );

    let router_config = RouterConfig {
        heartbeat_interval_ms: config.network.heartbeat_interval_ms,
        message_ttl_ms: config.network.timeout_ms,
        metrics_interval_ms: config.network.heartbeat_interval_ms,
        expiry_sweep_interval_ms: 60_000,
        peer_stale_after_ms: config.network.heartbeat_interval_ms * 3,
    };
    let core = Arc::new(RouterCore::new(config.router_id.clone(), signer, authority, ledger, processor, transfer_manager, router_config));
    core.start().await;

    let prometheus = PrometheusBuilder::new().install_recorder().ok();
    let admin_state = AdminState { core: core.clone(), prometheus };
    let host = config.host.clone();
    let port = config.port as u16;
    tokio::spawn(async move {
        if let Err(e) = finp2p_router::start_admin_server(&host, port, admin_state).await {
            error!(error = %e, "admin HTTP surface exited");
        }
    });

    info!("router running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    core.stop().await;
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())).unwrap_or_else(|| "unknown location".to_string());
        eprintln!("router panicked at {location}: {info}");
    }));
}

fn init_logging(router_id: &str, log_level: &str) {
    let log_filename = format!("logs/audit-{router_id}.log");
    let file_appender = tracing_appender::rolling::never(".", log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked deliberately: the guard must outlive the process to flush
    // buffered writes, and `main` never returns it to a caller who could
    // hold it instead.
    std::mem::forget(guard);

    let audit_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false).with_filter(
        tracing_subscriber::filter::filter_fn(|metadata| metadata.target().starts_with("finp2p_confirmation") || metadata.target().starts_with("finp2p_authority")),
    );

    let default_filter = format!("{log_level},finp2p_node=debug");
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()));

    tracing_subscriber::registry().with(audit_layer).with(stdout_layer).init();
}

fn load_or_generate_signer(path: &str) -> Result<RouterSigner, Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        let hex_seed = std::fs::read_to_string(path)?;
        let bytes = hex::decode(hex_seed.trim())?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| "keypair file does not contain a 32-byte seed")?;
        Ok(RouterSigner::from_bytes(&seed))
    } else {
        let signer = RouterSigner::generate();
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, hex::encode(signer.to_bytes()))?;
        eprintln!("no keypair found at {path}, generated and saved a new one");
        Ok(signer)
    }
}
