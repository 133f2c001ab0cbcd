use tokio::signal;
use tracing_subscriber::EnvFilter;

use casedesk::{config::AppConfig, db, scheduler::Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    config.alerts.validate()?;
    tracing::info!(
        component = "scheduler",
        database_url = %config.redacted_database_url(),
        pool_size = 2,
        anticipation_days = config.alerts.anticipation_days,
        retention_days = config.alerts.retention_days,
        "loaded casedesk configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 2)?;
    let scheduler = Scheduler::new(pool, config.alerts.clone(), config.schedule.clone());

    tokio::select! {
        _ = scheduler.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("scheduler received shutdown signal");
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
