use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::panic;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use session_sync::auth::AuthContext;
use session_sync::clients::BackendClient;
use session_sync::services::{auth_service, session_service};
use session_sync::store::LocalStore;
use session_sync::sync::LogSurface;
use session_sync::ws::{ChannelConfig, ChannelHandle};
use session_sync::{ClientOptions, Config, SessionSyncClient, SyncError, UiInput};

#[derive(Parser, Debug)]
#[command(name = "session-sync", version, about = "Join and drive a shared coding session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a session and drive it from stdin
    Session {
        #[arg(long)]
        link: String,
    },
    /// Join a session as a student
    Join {
        #[arg(long)]
        link: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Create a session as the signed-in mentor
    Create {
        #[arg(long)]
        name: String,
        /// Origin used for the share URL
        #[arg(long, default_value = "http://localhost:3000")]
        origin: String,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Set a new password with the token from a reset email
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long)]
        password: String,
    },
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    let cli = Cli::parse();

    // Loaded first so its log level can seed the filter
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .init();

    if let Err(e) = &loaded {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
    }

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<(), SyncError> {
    let store = LocalStore::open(&config.data_dir)?;
    let mut auth = AuthContext::init(store);
    let api = Arc::new(BackendClient::new(&config.backend_url, config.request_timeout())?);

    match command {
        Command::Session { link } => run_session(config, auth, api, link).await,
        Command::Join { link, name, email } => {
            let target = session_service::join_session(&api, &mut auth, &link, &name, &email).await?;
            info!("✅ Joined. Open it with: session-sync session --link {}", target);
            Ok(())
        }
        Command::Create { name, origin } => {
            let created = session_service::create_session(&api, &auth, &name, &origin).await?;
            info!("🚀 Session created. Share this link: {}", created.share_url);
            Ok(())
        }
        Command::Login { email, password } => {
            let user = auth_service::login(&api, &mut auth, &email, &password).await?;
            info!("Signed in as {}", user.name);
            Ok(())
        }
        Command::Signup { name, email, password } => {
            let user = auth_service::signup(&api, &mut auth, &name, &email, &password).await?;
            info!("Welcome, {}", user.name);
            Ok(())
        }
        Command::ResetPassword { token, password } => {
            let message = auth_service::reset_password(&api, &token, &password).await?;
            info!("{}", message);
            Ok(())
        }
        Command::Logout => auth.teardown(Some(&api)).await,
    }
}

async fn run_session(
    config: &Config,
    auth: AuthContext,
    api: Arc<BackendClient>,
    link: String,
) -> Result<(), SyncError> {
    if !auth.can_enter_session() {
        return Err(SyncError::Validation(
            "Sign in or join the session before opening it.".to_string(),
        ));
    }

    let channel = ChannelHandle::connect(ChannelConfig {
        url: config.socket_url().to_string(),
        reconnect_delay: config.reconnect_delay(),
        reconnect_max_delay: config.reconnect_max_delay(),
    })?;
    info!("📡 Real-time channel at {}", config.socket_url());

    let options = ClientOptions {
        edit_debounce: config.edit_debounce(),
        language: config.language.clone(),
    };
    let client = SessionSyncClient::new(link, options, api.clone(), auth, channel, LogSurface::default());

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let stdin_tx = input_tx.clone();
    std::thread::spawn(move || read_commands(stdin_tx));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = input_tx.send(UiInput::Unload);
        }
    });

    let last = client.run(input_rx).await;
    info!("Session {} closed ({:?})", last.link, last.phase);

    // Presence beacons run on their own threads; let them land before exit
    if let Err(e) = tokio::task::spawn_blocking(move || api.flush_beacons()).await {
        warn!("Beacon flush failed: {}", e);
    }
    Ok(())
}

/// Feed stdin lines to the session. End of input closes the page.
///
/// Runs on a plain thread: a blocked stdin read must not hold up runtime
/// shutdown once the session has been left.
fn read_commands(inputs: mpsc::UnboundedSender<UiInput>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Some(input) => {
                if inputs.send(input).is_err() {
                    return;
                }
            }
            None if line.trim().is_empty() => {}
            None => warn!("Unknown command: {} (run, leave, end, cursor <line> <col>, code <text>)", line.trim()),
        }
    }
    let _ = inputs.send(UiInput::Unload);
}

fn parse_command(line: &str) -> Option<UiInput> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (verb, rest) = match line.trim_start().split_once(' ') {
        Some((verb, rest)) => (verb, rest),
        None => (line.trim(), ""),
    };
    match verb {
        "run" => Some(UiInput::Run),
        "leave" => Some(UiInput::Leave),
        "end" => Some(UiInput::End),
        "code" => Some(UiInput::Edit(rest.replace("\\n", "\n"))),
        "cursor" => {
            let mut parts = rest.split_whitespace();
            let line = parts.next()?.parse().ok()?;
            let column = parts.next()?.parse().ok()?;
            Some(UiInput::CursorMoved { line, column })
        }
        _ => None,
    }
}
