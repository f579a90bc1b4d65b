use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use outbox_relay::broker::Broker;
use outbox_relay::broker::RedisBroker;
use outbox_relay::configuration::get_configuration;
use outbox_relay::email_client::EmailTransport;
use outbox_relay::email_client::SmtpEmailClient;
use outbox_relay::outbox::Producer;
use outbox_relay::startup::get_connection_pool;
use outbox_relay::startup::Application;
use outbox_relay::telemetry::get_subscriber;
use outbox_relay::telemetry::init_subscriber;
use outbox_relay::worker::WorkerPool;
use tokio::sync::watch;
use tokio::task::JoinError;

fn report_exit(
    name: &str,
    // damn, how do you derive this type? beats me...
    outcome: Result<Result<(), impl Debug + Display>, JoinError>,
) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }

        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (inner)"
            )
        }

        Err(e) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (outer)"
            )
        }
    }
}

/// Initialise telemetry, load config, and start the server, producer, and
/// worker pool.
#[tokio::main] // requires tokio features: macros, rt-multi-thread
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("outbox-relay", "info", std::io::stdout);
    init_subscriber(subscriber);

    let cfg = get_configuration()?;
    cfg.mail.sender().map_err(anyhow::Error::msg)?;

    let pool = get_connection_pool(&cfg.database);
    let broker: Arc<dyn Broker> = Arc::new(RedisBroker::connect(&cfg.broker.connection_url()).await?);
    let transport: Arc<dyn EmailTransport> = Arc::new(
        SmtpEmailClient::new(
            &cfg.mail.smtp_host,
            cfg.mail.smtp_port,
            cfg.mail.smtp_username.clone(),
            cfg.mail.smtp_password.clone(),
        )
        .map_err(anyhow::Error::msg)?,
    );

    let application = Application::build(cfg.clone()).await?;
    let producer = Producer::new(pool.clone(), Arc::clone(&broker), cfg.producer.clone());
    let worker_pool = WorkerPool::new(pool, broker, transport, cfg.worker.clone());

    // Closing over `false` means "keep running"; flipping it to `true` is the
    // signal for the producer and worker pool to stop claiming new work.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let graceful_timeout = Duration::from_secs(cfg.shutdown.graceful_timeout_secs);

    // If `spawn` is not called, all async branches are run on the same thread, and
    // the branches run concurrently, but -not- in parallel. If one branch
    // blocks the thread, -all- other branches will be unable to continue!
    let mut server_task = tokio::spawn(application.run_until_stopped());
    let mut producer_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            producer.run_forever(shutdown_rx).await;
            Ok::<(), anyhow::Error>(())
        }
    });
    let mut worker_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            worker_pool.run(shutdown_rx).await;
            Ok::<(), anyhow::Error>(())
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, waiting up to {graceful_timeout:?} for producer and workers to drain");
            let _ = shutdown_tx.send(true);

            let drained = tokio::time::timeout(graceful_timeout, async {
                let _ = (&mut producer_task).await;
                let _ = (&mut worker_task).await;
            })
            .await;

            if drained.is_err() {
                tracing::warn!("graceful shutdown timed out, aborting remaining tasks");
                producer_task.abort();
                worker_task.abort();
            }
            server_task.abort();
        }
        o = &mut server_task => { report_exit("API", o) },
        o = &mut producer_task => { report_exit("Producer", o) },
        o = &mut worker_task => { report_exit("Worker pool", o) },
    }

    Ok(())
}
