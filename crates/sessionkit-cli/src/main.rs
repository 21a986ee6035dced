//! sessionkit - command-line driver for the auth session library.
//!
//! Restores the persisted session at startup, then runs one command
//! against the configured auth service.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use sessionkit_core::{Config, InactivityState, SessionController, SessionError};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: sessionkit <command>

Commands:
  login [email]             Sign in (password is prompted)
  register <name> [email]   Create an account (does not sign in)
  logout                    End the current session
  whoami                    Show the signed-in user
  forgot-password [email]   Request a password reset link
  get <path>                Authenticated GET, prints the JSON response
  watch                     Show the inactivity countdown.
                            Enter records activity, 's' stays logged in

Environment:
  SESSIONKIT_API_BASE_URL    Auth service base URL
  SESSIONKIT_API_TIMEOUT_MS  Request timeout in milliseconds
  RUST_LOG                   Log filter (default: warn)";

/// Initialize the tracing subscriber for logging.
/// The returned guard must stay alive so buffered lines are flushed.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    let store = config.session_store()?;
    let controller = SessionController::from_config(&config, store)
        .context("Failed to build HTTP client")?;

    if controller.hydrate().await {
        info!("Restored persisted session");
    }

    let result = match command {
        "login" => login(&controller, &mut config, args.get(1)).await,
        "register" => register(&controller, &config, &args[1..]).await,
        "logout" => logout(&controller).await,
        "whoami" => whoami(&controller).await,
        "forgot-password" => forgot_password(&controller, &config, args.get(1)).await,
        "get" => match args.get(1) {
            Some(path) => get(&controller, path).await,
            None => bail!("Usage: sessionkit get <path>"),
        },
        "watch" => watch(&controller).await,
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    if let Err(e) = result {
        // Session errors already carry a message meant for people
        match e.downcast_ref::<SessionError>() {
            Some(session_err) => eprintln!("Error: {}", session_err.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        drop(guard);
        std::process::exit(1);
    }

    Ok(())
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim();
    Ok(match (value.is_empty(), default) {
        (true, Some(d)) => d.to_string(),
        _ => value.to_string(),
    })
}

fn resolve_email(given: Option<&String>, config: &Config) -> Result<String> {
    match given {
        Some(email) => Ok(email.clone()),
        None => prompt("Email", config.last_email.as_deref()),
    }
}

async fn login(
    controller: &SessionController,
    config: &mut Config,
    email: Option<&String>,
) -> Result<()> {
    let email = resolve_email(email, config)?;
    let password = rpassword::prompt_password("Password: ")?;

    let user = controller.login(&email, &password).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Login successful! Signed in as {}", user.display_name());
    Ok(())
}

async fn register(controller: &SessionController, config: &Config, args: &[String]) -> Result<()> {
    let name = match args.first() {
        Some(name) => name.clone(),
        None => prompt("Full name", None)?,
    };
    let email = resolve_email(args.get(1), config)?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let user = controller.register(&name, &email, &password).await?;
    println!(
        "Account created for {}. Run `sessionkit login {}` to sign in.",
        user.display_name(),
        user.email
    );
    Ok(())
}

async fn logout(controller: &SessionController) -> Result<()> {
    if !controller.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }
    controller.logout().await;
    println!("Signed out.");
    Ok(())
}

async fn whoami(controller: &SessionController) -> Result<()> {
    if !controller.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }

    let user = match controller.reload_user().await {
        Ok(user) => user,
        Err(SessionError::NetworkError(msg)) => {
            warn!(error = %msg, "Could not reach auth service, showing stored identity");
            controller.user().ok_or(SessionError::NotAuthenticated)?
        }
        Err(e) => return Err(e.into()),
    };

    println!("{} <{}> (id {})", user.display_name(), user.email, user.id);
    if let Some(minutes) = controller.session_age_minutes() {
        println!("Session age: {} min", minutes);
    }
    Ok(())
}

async fn forgot_password(
    controller: &SessionController,
    config: &Config,
    email: Option<&String>,
) -> Result<()> {
    let email = resolve_email(email, config)?;
    let message = controller.forgot_password(&email).await?;
    if message.is_empty() {
        println!("If an account exists for {}, a reset link has been sent.", email);
    } else {
        println!("{}", message);
    }
    Ok(())
}

async fn get(controller: &SessionController, path: &str) -> Result<()> {
    let value: serde_json::Value = controller.transport().get(path).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

enum Input {
    Activity,
    Stay,
}

/// Drive the inactivity monitor from the terminal until the session ends
async fn watch(controller: &SessionController) -> Result<()> {
    if !controller.is_authenticated() {
        bail!("Not signed in");
    }

    // tokio's stdin reads cannot be cancelled and would hold up runtime shutdown
    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let input = if line.trim().eq_ignore_ascii_case("s") {
                Input::Stay
            } else {
                Input::Activity
            };
            if tx.send(input).is_err() {
                break;
            }
        }
    });

    let mut snapshots = controller.subscribe_inactivity();
    let mut last = InactivityState::Idle;
    controller.record_activity();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *snapshots.borrow_and_update();
                match snapshot.state {
                    InactivityState::Warning => println!(
                        "Your session is about to expire: {}s left. Type 's' to stay logged in.",
                        snapshot.remaining_secs
                    ),
                    InactivityState::Active if last != InactivityState::Active => {
                        println!("Active: {}s until timeout", snapshot.remaining_secs)
                    }
                    InactivityState::Active => {}
                    InactivityState::Expired => println!("Session expired due to inactivity, signing out..."),
                    InactivityState::Idle => {
                        println!("Session ended.");
                        break;
                    }
                }
                last = snapshot.state;
            }
            input = rx.recv() => match input {
                Some(Input::Stay) => {
                    controller.stay_logged_in();
                }
                Some(Input::Activity) => controller.record_activity(),
                None => break,
            },
        }
    }

    // The expiry logout runs on its own task; let it reach the server
    controller.settled().await;
    Ok(())
}
