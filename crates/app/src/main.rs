use prep_core::model::QuestionBank;
use services::{AccountServiceError, AppServices, Clock};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod practice;

use cli::{Args, ArgsError, Command, Credentials, Identity, print_usage};
use config::AppConfig;
use practice::{Console, run_practice};

fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    // Quiz output owns stdout; logs go to stderr.
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

fn load_bank(path: &std::path::Path) -> Result<QuestionBank, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read question bank {}: {e}", path.display()))?;
    let bank = QuestionBank::from_json(&json)?;
    tracing::info!(
        path = %path.display(),
        questions = bank.len(),
        modules = bank.modules().len(),
        "question bank loaded"
    );
    Ok(bank)
}

async fn open_services(db_url: &str) -> Result<AppServices, Box<dyn std::error::Error>> {
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(db_url)?;
    Ok(AppServices::new_sqlite(db_url, Clock::System).await?)
}

async fn sign_in(
    services: &AppServices,
    credentials: &Credentials,
) -> Result<prep_core::model::AccountSummary, Box<dyn std::error::Error>> {
    match services
        .accounts()
        .sign_in(&credentials.email, &credentials.password)
        .await
    {
        Ok(summary) => Ok(summary),
        Err(AccountServiceError::NotAuthenticated) => Err("invalid email or password".into()),
        Err(e) => Err(e.into()),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    init_tracing(&config.rust_log);

    let parsed = match Args::parse(std::env::args().skip(1), &config) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            print_usage();
            return Err(e.into());
        }
    };

    match parsed.command {
        Command::Register {
            email,
            username,
            password,
            admin,
            actor,
        } => {
            let services = open_services(&parsed.db_url).await?;
            let actor = match &actor {
                Some(credentials) => Some(sign_in(&services, credentials).await?),
                None => None,
            };
            let accounts = services.accounts();
            let summary = if admin {
                accounts
                    .register_admin(actor.as_ref(), &email, &username, &password)
                    .await?
            } else {
                accounts.register(&email, &username, &password).await?
            };
            println!(
                "Registered {} ({}){}",
                summary.username,
                summary.id,
                if summary.is_admin { " as administrator" } else { "" }
            );
            Ok(())
        }
        Command::Practice(args) => {
            let bank = load_bank(&parsed.bank)?;
            let mut console = Console::new();
            match &args.identity {
                Identity::Guest => {
                    let services = AppServices::in_memory(Clock::System);
                    let guest = services.accounts().guest();
                    println!("Practicing as {}.", guest.username);
                    run_practice(&services, guest.id, true, &bank, &args, &mut console).await
                }
                Identity::Account(credentials) => {
                    let services = open_services(&parsed.db_url).await?;
                    let account = sign_in(&services, credentials).await?;
                    println!("Welcome back, {}.", account.username);
                    run_practice(&services, account.id, false, &bank, &args, &mut console).await
                }
            }
        }
        Command::Stats(credentials) => {
            let services = open_services(&parsed.db_url).await?;
            let account = sign_in(&services, &credentials).await?;
            let dashboard = services.history().dashboard(account.id).await?;
            println!("Tests taken:     {}", dashboard.stats.count);
            println!("Average score:   {}%", dashboard.stats.average_percent);
            if dashboard.recent.is_empty() {
                println!("No completed tests yet.");
            } else {
                println!("Recent tests:");
                for item in &dashboard.recent {
                    println!(
                        "  {}  {}/{} ({}%){}",
                        item.completed_at.format("%Y-%m-%d %H:%M"),
                        item.score,
                        item.total,
                        item.percent,
                        if item.passed { "  passed" } else { "" }
                    );
                }
            }
            Ok(())
        }
        Command::Accounts(credentials) => {
            let services = open_services(&parsed.db_url).await?;
            let actor = sign_in(&services, &credentials).await?;
            for account in services.accounts().list_accounts(&actor).await? {
                println!(
                    "{}  {:<32} {:<20}{}",
                    account.id,
                    account.email.as_deref().unwrap_or("-"),
                    account.username,
                    if account.is_admin { " admin" } else { "" }
                );
            }
            Ok(())
        }
        Command::DeleteAccount { credentials, id } => {
            let services = open_services(&parsed.db_url).await?;
            let actor = sign_in(&services, &credentials).await?;
            services.accounts().delete_account(&actor, id).await?;
            println!("Deleted account {id}.");
            Ok(())
        }
    }
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
