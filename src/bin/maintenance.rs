use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use casedesk::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    domain::{ROLE_STAFF, ROLE_USER},
    jobs::job_counts,
    models::NewUser,
    scheduler::{run_task, PeriodicTask},
    schema::users,
    validation::optional_email,
};

const USAGE: &str = "Usage: maintenance <command>
  create-alerts | dispatch-alerts | refresh-urgency | purge-alerts
  create-user <username> <password> [--email <address>] [--staff]
  job-counts";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        %command,
        "loaded casedesk configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;

    match command.as_str() {
        "create-user" => {
            let mut conn = pool.get().context("failed to get database connection")?;
            create_user(&mut conn, args.collect())?;
        }
        "job-counts" => {
            let mut conn = pool.get().context("failed to get database connection")?;
            let counts = job_counts(&mut conn).context("failed to count jobs")?;
            if counts.is_empty() {
                println!("No jobs queued.");
            }
            for (status, count) in counts {
                println!("{status}: {count}");
            }
        }
        name => match PeriodicTask::from_name(name) {
            Some(task) => {
                config.alerts.validate()?;
                run_task(&pool, &config.alerts, task).await?;
                println!("{name} finished.");
            }
            None => {
                eprintln!("Unknown command: {name}\n{USAGE}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct UserArgs {
    username: String,
    password: String,
    email: Option<String>,
    staff: bool,
}

fn parse_user_args(args: Vec<String>) -> Result<UserArgs> {
    let mut positional = Vec::new();
    let mut email = None;
    let mut staff = false;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--staff" => staff = true,
            "--email" => {
                let value = iter.next().context("--email needs an address")?;
                email = optional_email("email", Some(&value))?;
            }
            _ => positional.push(arg),
        }
    }
    let [username, password]: [String; 2] = positional
        .try_into()
        .map_err(|_| anyhow::anyhow!("create-user takes <username> <password>\n{USAGE}"))?;
    if username.trim().is_empty() || password.is_empty() {
        bail!("username and password must not be empty");
    }
    Ok(UserArgs {
        username: username.trim().to_string(),
        password,
        email,
        staff,
    })
}

fn create_user(conn: &mut PgConnection, args: Vec<String>) -> Result<()> {
    let args = parse_user_args(args)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: args.username,
        email: args.email,
        password_hash: hash_password(&args.password)?,
        role: if args.staff { ROLE_STAFF } else { ROLE_USER }.to_string(),
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(conn)
        .with_context(|| format!("failed to create user {}", new_user.username))?;
    println!("Created {} user {} ({}).", new_user.role, new_user.username, new_user.id);
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
