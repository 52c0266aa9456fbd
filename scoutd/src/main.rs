use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::protocol::META_QUERY_TYPE;
use scoutd::api;
use scoutd::config::Config;
use scoutd::discovery::ServiceBrowser;
use scoutd::handlers::builtin::register_builtin;
use scoutd::identity::probe::SystemProbe;
use scoutd::identity::vendor::db::OuiDb;
use scoutd::identity::vendor::VendorDbHandle;
use scoutd::mdns;
use scoutd::mdns::browser::MdnsBrowser;
use scoutd::mdns::resolver::{MdnsResolver, ResolvedRecords};
use scoutd::notify::Notifier;
use scoutd::scanner::Scanner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scoutd=info"))
        )
        .init();

    tracing::info!("Starting scoutd");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            tracing::info!("Loaded config from {}", path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };

    // Vendor lookups degrade to an empty in-memory table when the database cannot be opened
    let oui_db = match OuiDb::open(&config.enrichment.oui_db_path, &config.enrichment.oui_source) {
        Ok(db) => db,
        Err(e) => {
            tracing::warn!("Vendor database unavailable, using in-memory table: {:#}", e);
            OuiDb::open_in_memory(&config.enrichment.oui_source)?
        }
    };
    let vendor_db = VendorDbHandle::spawn(oui_db);

    let mdns_daemon = mdns::start_daemon(config.discovery.interface.as_deref())?;
    let records = Arc::new(ResolvedRecords::new());
    let (browser, receiver_queue) = MdnsBrowser::new(mdns_daemon.clone());
    let browser = Arc::new(browser);

    let scanner = Arc::new(Scanner::new(
        &config,
        browser.clone(),
        Arc::new(MdnsResolver::new(records.clone())),
        Arc::new(SystemProbe::new(config.enrichment.probe_timeout())),
        Arc::new(vendor_db.clone()),
        Notifier::stdout(config.notifications.enabled),
    ));
    register_builtin(scanner.handlers());

    let cancel = CancellationToken::new();

    // Spawn mDNS event pump
    let (event_tx, event_rx) = mpsc::channel(config.discovery.event_buffer);
    let pump_cancel = cancel.clone();
    let pump_handle = tokio::spawn(async move {
        if let Err(e) = mdns::browser::run_pump(receiver_queue, records, event_tx, pump_cancel).await {
            tracing::error!("mDNS event pump error: {}", e);
        }
    });

    browser
        .browse(META_QUERY_TYPE)
        .context("Failed to start meta-query browse")?;

    // Spawn discovery orchestrator
    let orchestrator = scanner.orchestrator().clone();
    let orchestrator_cancel = cancel.clone();
    let orchestrator_handle = tokio::spawn(async move {
        if let Err(e) = orchestrator.run(event_rx, orchestrator_cancel).await {
            tracing::error!("Discovery orchestrator error: {}", e);
        }
    });

    // Discovery lines show during the initial scan window, then go quiet
    if config.notifications.enabled && config.notifications.initial_scan_secs > 0 {
        let scan_scanner = scanner.clone();
        let scan_cancel = cancel.clone();
        let window = Duration::from_secs(config.notifications.initial_scan_secs);
        tokio::spawn(async move {
            tokio::select! {
                _ = scan_scanner.scan(window) => {}
                _ = scan_cancel.cancelled() => {}
            }
        });
    }

    // Build API router
    let app = api::routes::router(api::routes::AppState {
        scanner: scanner.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = tokio::join!(pump_handle, orchestrator_handle, server_handle);

    if let Some(path) = &config.export.on_shutdown {
        let settle = tokio::time::timeout(Duration::from_secs(5), scanner.quiesce()).await;
        if settle.is_err() {
            tracing::warn!("Exporting before enrichment settled");
        }
        if let Err(e) = scanner.export_json(path) {
            tracing::error!("Failed to export devices: {:#}", e);
        }
    }

    if let Err(e) = vendor_db.shutdown() {
        tracing::error!("Failed to shutdown vendor database: {}", e);
    }

    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
