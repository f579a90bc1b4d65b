use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::configuration::DatabaseSettings;
use crate::configuration::Settings;
use crate::routes::health_check;
use crate::routes::metrics;
use crate::routes::send_mail;

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
///
/// Only the HTTP ingress lives here. The producer and worker pool run as
/// independent tokio tasks (see `main.rs`) — they have no HTTP surface of
/// their own, so they don't need an `Application`.
pub struct Application {
    /// Left private; use `get_port` to access
    port: u16,
    server: Server,
}

impl Application {
    /// Wrapper over `startup::run` that builds a `Server`
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;

        // get the randomised port assigned by OS; this will be saved in the `port`
        // field
        let port = listener.local_addr()?.port();

        let pool = get_connection_pool(&cfg.database);

        let server = run(listener, pool)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(db_cfg.connection())
}

/// The server is not responsible for binding to an address, it only listens
/// to an already bound address.
///
/// Declares the HTTP surface: ingress for new mail requests, a health
/// check, and a prometheus scrape endpoint.
pub fn run(
    listener: TcpListener,
    pool: PgPool,
) -> Result<Server, anyhow::Error> {
    // `Data` is externally an `Arc` (for sharing/cloning), internally a `HashMap`
    // (for wrapping arbitrary types)
    let pool = web::Data::new(pool);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default()) // wrap the whole app in tracing middleware
            .route("/health_check", web::get().to(health_check))
            .route("/metrics", web::get().to(metrics))
            .route("/api/mail/send", web::post().to(send_mail))
            .app_data(pool.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
