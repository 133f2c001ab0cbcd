use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use casedesk::{
    alerts::Notifier, config::AppConfig, db, default_handlers, mailer::build_mailer, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    config.alerts.validate()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        mail_relay = config.mail.api_url.is_some(),
        max_retries = config.alerts.max_retries,
        retry_backoff_secs = config.alerts.retry_backoff.as_secs(),
        "loaded casedesk configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let notifier = Notifier::new(
        pool,
        build_mailer(&config.mail)?,
        config.alerts.clone(),
        config.public_base_url.clone(),
    );
    let worker = Worker::new(
        Arc::new(notifier),
        default_handlers(),
        config.schedule.worker_poll_interval,
    );

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
