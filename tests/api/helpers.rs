use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use outbox_relay::broker::Broker;
use outbox_relay::broker::FakeBroker;
use outbox_relay::broker::Priority;
use outbox_relay::configuration::get_configuration;
use outbox_relay::configuration::DatabaseSettings;
use outbox_relay::configuration::ProducerSettings;
use outbox_relay::email_client::RecordingEmailClient;
use outbox_relay::outbox::producer::Producer;
use outbox_relay::outbox::OutboxResult;
use outbox_relay::startup::get_connection_pool;
use outbox_relay::startup::Application;
use outbox_relay::telemetry::get_subscriber;
use outbox_relay::telemetry::init_subscriber;
use outbox_relay::worker::email::handle_email_deliver;
use sqlx::Connection;
use sqlx::Executor;
use sqlx::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

/// Init a static subscriber using the `once_cell` crate; alternatives include
/// `std::cell:OnceCell` and `lazy_static` (crate).
///
/// To opt in to verbose logging, use the env var `TEST_LOG`:
///
/// ```sh
///      TEST_LOG=true cargo test [test_name] | bunyan
/// ```
static TRACING: Lazy<()> = Lazy::new(|| {
    match std::env::var("TEST_LOG") {
        Ok(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::stdout);
            init_subscriber(subscriber);
        }
        Err(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::sink);
            init_subscriber(subscriber);
        }
    };
});

/// A running `Application` plus the fake broker and recording email client
/// standing in for Redis and SMTP. Tests drive the producer and worker pool
/// by hand (`run_producer_once` / `run_worker_once`) instead of waiting on
/// their real tick/poll loops.
pub struct TestApp {
    pub addr: String,
    pub port: u16,
    pub pool: PgPool,
    pub broker: Arc<FakeBroker>,
    pub transport: Arc<RecordingEmailClient>,
    producer_settings: ProducerSettings,
}

impl TestApp {
    pub async fn post_mail(
        &self,
        body: serde_json::Value,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/api/mail/send", self.addr))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Claims and publishes whatever is in the outbox right now, same as one
    /// tick of the real producer.
    pub async fn run_producer_once(&self) -> OutboxResult<usize> {
        let broker: Arc<dyn Broker> = Arc::clone(&self.broker) as Arc<dyn Broker>;
        let producer = Producer::new(self.pool.clone(), broker, self.producer_settings.clone());
        producer.run_once().await
    }

    /// Dequeues and executes exactly one task, acking or nacking it exactly
    /// as `worker::WorkerPool` would. Returns `false` if nothing was queued.
    pub async fn run_worker_once(&self) -> bool {
        let priorities = [Priority::Critical, Priority::Default, Priority::Low];
        let Some(task) = self
            .broker
            .dequeue(&priorities, Duration::from_millis(50))
            .await
            .unwrap()
        else {
            return false;
        };

        match handle_email_deliver(&self.pool, self.transport.as_ref(), &task.payload).await {
            Ok(()) => self.broker.ack(&task).await.unwrap(),
            Err(err) if err.is_terminal() => self.broker.ack(&task).await.unwrap(),
            Err(_) => self.broker.nack(task).await.unwrap(),
        }
        true
    }
}

/// Read `DatabaseSettings` and create a db with a randomised name (but with
/// the same migrations/tables, specified in the `migrations` directory). The
/// connection to this db can then be used to run a single test.
async fn configure_database(cfg: &DatabaseSettings) -> PgPool {
    let mut conn = PgConnection::connect_with(&cfg.connection_without_db())
        .await
        .expect("postgres must be running; run scripts/init_db.sh");

    conn.execute(format!(r#"CREATE DATABASE "{}";"#, cfg.database_name).as_str())
        .await
        .unwrap();

    let pool = PgPool::connect_with(cfg.connection()).await.unwrap();
    sqlx::migrate!().run(&pool).await.expect("failed to migrate");
    pool
}

/// Spawn a `TestApp` containing default config, which can be used for
/// testing; part of the setup is handled by `startup::Application`. The
/// broker and SMTP transport are fakes owned by the `TestApp`, not wired
/// into `Application` itself.
pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let cfg = {
        let mut rand_cfg = get_configuration().unwrap();

        // random db name, one per test
        rand_cfg.database.database_name = Uuid::new_v4().to_string();

        // port 0 is reserved by the OS; the server will be spawned on an address with
        // a random available port
        rand_cfg.application.port = 0;

        rand_cfg
    };

    let _pool = configure_database(&cfg.database).await;

    let app = Application::build(cfg.clone()).await.unwrap();
    let addr = format!("http://localhost:{}", app.get_port());
    let port = app.get_port();

    let pool = get_connection_pool(&cfg.database);
    tokio::spawn(app.run_until_stopped());

    TestApp {
        addr,
        port,
        pool,
        broker: Arc::new(FakeBroker::new()),
        transport: Arc::new(RecordingEmailClient::new()),
        producer_settings: cfg.producer,
    }
}
