//! # Shortener API
//!
//! RESTful HTTP surface for the URL shortener's write/read hot-path core.
//! Wires the concrete collaborator adapters (SQLite durable store +
//! ledger + job queue, in-process KV, log-backed event bus) to
//! [`shortener_core::Engine`] and serves spec.md §6's endpoints.
//!
//! ## Architecture
//!
//! - **Actix Web**: HTTP server and routing.
//! - **SQLite**: durable store, allocation ledger, and job queue, all
//!   backed by the same connection (`URL_DSN`/`RIVER_DSN`).
//! - **In-process KV**: front cache and view-counter backing store.
//! - **`crossbeam_channel`**: fan-out from the event bus to the fraud
//!   scanner's dedicated consumer thread.
//!
//! ## Network
//!
//! By default the service listens on `0.0.0.0:8080`. Override with
//! `--ip`/`--port`.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{middleware, web, App, HttpServer};

use shortener_api::bus::log_bus::LogBus;
use shortener_api::fraud_scanner::{FraudScanner, SubstringReputationCheck};
use shortener_api::kv::memory_kv::MemoryKv;
use shortener_api::store::sqlite_store::SqliteStore;
use shortener_api::{api, config, rate_limit};
use shortener_core::Engine;

/// How often the job-queue retry ticker replays pending `jobs` rows
/// against the durable store (spec.md §7's "retry with backoff" —
/// fixed-interval here, since SQLite's own row-level locking already
/// bounds contention).
const JOB_RETRY_INTERVAL: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    env_logger::init();

    let matches = clap::Command::new("Shortener API")
        .version("0.1.0")
        .author("shortener")
        .about("Write/read hot-path coordination service for the URL shortener")
        .arg(
            clap::Arg::new("ip")
                .long("ip")
                .help("IP address to bind the server to")
                .value_name("IP")
                .default_value("0.0.0.0"),
        )
        .arg(
            clap::Arg::new("port")
                .long("port")
                .help("Port number to bind the server to")
                .value_name("PORT")
                .default_value("8080")
                .value_parser(clap::value_parser!(u16)),
        )
        .get_matches();

    let ip = matches.get_one::<String>("ip").unwrap();
    let port = matches.get_one::<u16>("port").unwrap();
    let bind_address = format!("{ip}:{port}");

    let store = match SqliteStore::open(&config::url_dsn()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("failed to open durable store at {}: {e}", config::url_dsn());
            std::process::exit(1);
        }
    };

    let kv = Arc::new(MemoryKv::new());
    let (fraud_tx, fraud_rx) = crossbeam_channel::unbounded();
    let bus = Arc::new(LogBus::new(fraud_tx));

    let engine = match Engine::start(
        store.clone(),
        store.clone(),
        kv,
        store.clone(),
        bus,
        Some(config::shard_count()),
    )
    .await
    {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("failed to start engine: {e}");
            std::process::exit(1);
        }
    };

    let scanner = FraudScanner::new(
        fraud_rx,
        store.clone(),
        Arc::new(SubstringReputationCheck),
        tokio::runtime::Handle::current(),
    );
    let _scanner_handle = scanner.spawn();

    let job_retry_store = store.clone();
    let job_retry_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JOB_RETRY_INTERVAL);
        loop {
            ticker.tick().await;
            match job_retry_store.run_due_jobs().await {
                Ok(n) if n > 0 => log::info!("job retry ticker completed {n} jobs"),
                Ok(_) => {}
                Err(e) => log::error!("job retry ticker failed: {e}"),
            }
        }
    });

    let rate_limit_enabled = config::rate_limit_enabled();
    log::info!("starting HTTP server on {bind_address} (rate_limit={rate_limit_enabled})");

    let engine_data = web::Data::new(engine.clone());
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(engine_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .wrap(middleware::Condition::new(
                rate_limit_enabled,
                rate_limit::RateLimit::new(),
            ))
            .configure(api::configure)
    })
    .bind(&bind_address)?
    .workers(4)
    .run();

    let server_handle = server.handle();
    tokio::spawn(server);

    tokio::signal::ctrl_c().await?;
    log::info!("received shutdown signal, draining in-flight work");

    job_retry_handle.abort();

    if let Err(e) = engine.lifecycle().shutdown().await {
        log::error!("error during engine shutdown: {e}");
    }

    server_handle.stop(true).await;
    log::info!("shutdown complete");
    Ok(())
}
