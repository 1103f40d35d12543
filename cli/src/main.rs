use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gate::edge::{EdgeAction, classify_request};
use gate::http_provider::HttpIdentityProvider;
use gate::token_store::FileTokenStore;
use gate::{AuthError, AuthSession, AuthSnapshot, AuthStatus, Credentials, GuardDecision, RouteGuard, RouteTable};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not signed in; run `tutorgate login` first")]
    NotSignedIn,
    #[error("{}", .0.user_message())]
    Auth(#[from] AuthError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("health check failed: HTTP {0}")]
    Unhealthy(u16),
    #[error("route table: {0}")]
    RouteTable(#[from] gate::routes::RouteTableError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tutorgate", about = "Tutoring portal sign-in and access-check CLI")]
struct Cli {
    #[arg(long, env = "TUTORGATE_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Where the session token is kept between invocations.
    #[arg(long, env = "TUTORGATE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the server is up.
    Ping,
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TUTORGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored token.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Re-fetch the signed-in user from the server.
    Refresh,
    /// Show what the edge gate and route guard would do for a path.
    Check {
        path: String,
        /// YAML route table; the built-in portal layout when omitted.
        #[arg(long)]
        routes: Option<PathBuf>,
    },
    /// Start Google sign-in, or finish it with the token the browser received.
    Google {
        #[arg(long, default_value = "/")]
        next: String,
        #[arg(long)]
        token: Option<String>,
    },
}

fn default_token_file() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map_or_else(|| PathBuf::from(".tutorgate-token.json"), |home| home.join(".config/tutorgate/token.json"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Ping = cli.command {
        return run_ping(&cli.base_url).await;
    }

    let provider = Arc::new(HttpIdentityProvider::new(&cli.base_url)?);
    let store = Arc::new(FileTokenStore::new(cli.token_file.unwrap_or_else(default_token_file)));
    let session = AuthSession::new(provider, store);

    match cli.command {
        Command::Ping => Ok(()),
        Command::Login { email, password } => {
            let user = session.login(&Credentials::new(email, password)).await?;
            print_json(&json!({ "signed_in": true, "user": user }))
        }
        Command::Logout => {
            session.initialize().await;
            session.logout_and_revoke().await;
            print_json(&json!({ "signed_in": false }))
        }
        Command::Whoami => {
            let snapshot = session.initialize().await;
            let user = snapshot.user().ok_or(CliError::NotSignedIn)?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Refresh => {
            session.initialize().await;
            let snapshot = session.refresh_user_data().await;
            print_json(&snapshot_json(&snapshot))
        }
        Command::Check { path, routes } => {
            let table = match routes {
                Some(file) => RouteTable::load(&file)?,
                None => RouteTable::default(),
            };
            let snapshot = session.initialize().await;
            print_json(&check_json(&table, &path, &snapshot))
        }
        Command::Google { next, token: None } => {
            println!("{}", session.login_with_google(&next));
            Ok(())
        }
        Command::Google { token: Some(token), .. } => {
            let snapshot = session.complete_oauth_login(Some(&token)).await;
            if !snapshot.is_authenticated() {
                return Err(snapshot.error.map_or(CliError::NotSignedIn, CliError::Auth));
            }
            print_json(&snapshot_json(&snapshot))
        }
    }
}

async fn run_ping(base_url: &str) -> Result<(), CliError> {
    let client = reqwest::Client::new();
    let url = format!("{}/healthz", base_url.trim_end_matches('/'));
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

fn snapshot_json(snapshot: &AuthSnapshot) -> Value {
    let status = match &snapshot.status {
        AuthStatus::Uninitialized => "uninitialized",
        AuthStatus::Loading => "loading",
        AuthStatus::Authenticated { .. } => "authenticated",
        AuthStatus::Unauthenticated => "unauthenticated",
    };
    json!({
        "status": status,
        "user": snapshot.user(),
        "error": snapshot.error.as_ref().map(AuthError::user_message),
    })
}

/// Edge and guard verdicts for `path` given the current session.
fn check_json(table: &RouteTable, path: &str, snapshot: &AuthSnapshot) -> Value {
    let edge = match classify_request(table, path, snapshot.token().is_some()) {
        EdgeAction::Continue => json!({ "action": "continue" }),
        EdgeAction::Redirect(to) => json!({ "action": "redirect", "to": to }),
    };
    let guard = match RouteGuard::for_path(table, path) {
        None => json!({ "decision": "unguarded" }),
        Some(guard) => match guard.decide(&snapshot.status, path) {
            GuardDecision::Pending => json!({ "decision": "pending" }),
            GuardDecision::Render => json!({ "decision": "render" }),
            GuardDecision::Redirect(to) => json!({ "decision": "redirect", "to": to }),
        },
    };
    json!({ "path": path, "class": format!("{:?}", table.classify(path)), "edge": edge, "guard": guard })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
