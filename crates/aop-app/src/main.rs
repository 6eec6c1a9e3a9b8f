//! AOP: command-line entry point.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use aop_auth::{
    AccountService, AdminRegisterInput, GuardKind, GuardView, RegisterInput, RouteGuard,
    SessionConfig, SessionManager,
};
use aop_backend::{BackendConfig, RestBackend};
use aop_core::repository::{IdentityProvider, SessionStore};
use aop_core::routes::{Redirect, RouteAccess, resolve};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aop=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let backend_config = BackendConfig::from_env()?;
    info!(url = %backend_config.url, "Starting AOP client");
    let backend = RestBackend::new(backend_config).context("building backend client")?;
    let _listener = backend.spawn_storage_listener();

    let mut session_config = SessionConfig::default();
    if let Some(origin) = cli.app_origin {
        session_config.app_origin = origin;
    }
    let accounts = AccountService::new(backend.clone(), backend.clone(), session_config.clone());
    let sessions = SessionManager::new(backend.clone(), backend.clone(), session_config);

    match cli.command {
        Command::SignIn(args) => {
            let redirect = match accounts
                .sign_in(&args.credentials.credentials(), args.remember)
                .await
            {
                Ok(redirect) => redirect,
                Err(e) => {
                    if let Some(to) = e.redirect() {
                        println!("redirect: {to}");
                    }
                    return Err(e.into());
                }
            };
            // Start the bookkeeping row right away, as the first guarded page would.
            if !sessions.validate_session().await {
                bail!("signed in, but no session could be recorded");
            }
            print_redirect(&redirect);
        }
        Command::AdminSignIn(args) => {
            if let Some(landing) = accounts.admin_landing().await {
                print_redirect(&landing);
                return Ok(());
            }
            let redirect = accounts
                .admin_sign_in(&args.credentials.credentials(), args.remember)
                .await?;
            if !sessions.validate_session().await {
                bail!("signed in, but no session could be recorded");
            }
            print_redirect(&redirect);
        }
        Command::Register(args) => {
            let redirect = accounts
                .register(RegisterInput {
                    credentials: args.credentials.credentials(),
                    full_name: args.name,
                    role: args.role.into(),
                })
                .await?;
            print_redirect(&redirect);
        }
        Command::RegisterAdmin(args) => {
            if let Some(landing) = accounts.admin_landing().await {
                print_redirect(&landing);
                return Ok(());
            }
            let redirect = accounts
                .register_admin(AdminRegisterInput {
                    credentials: args.credentials.credentials(),
                    full_name: args.name,
                })
                .await?;
            print_redirect(&redirect);
        }
        Command::ResetPassword { email, admin } => {
            if admin {
                accounts.request_admin_password_reset(&email).await?;
            } else {
                accounts.request_password_reset(&email).await?;
            }
            println!("Password reset instructions sent to {}", email.trim());
        }
        Command::SignOut => {
            sessions.end_session().await;
            println!("signed out");
        }
        Command::Check { path } => check(sessions, backend, &path).await?,
        Command::Session => {
            if !sessions.check().await {
                bail!("no valid session; sign in first");
            }
            let user = sessions
                .identity()
                .current_user()
                .await?
                .context("signed out during validation")?;
            let rows = sessions.store().list_for_user(user.id).await?;
            let Some(current) = rows.iter().find(|s| s.is_current(Utc::now())) else {
                bail!("no current session row");
            };
            println!("session:       {}", current.id);
            println!("user:          {}", current.user_id);
            println!("created_at:    {}", current.created_at.to_rfc3339());
            println!("last_activity: {}", current.last_activity.to_rfc3339());
            println!("expires_at:    {}", current.expires_at.to_rfc3339());
            if let Some(device) = &current.device_info {
                println!("device:        {device}");
            }
        }
    }
    Ok(())
}

async fn check(
    sessions: SessionManager<RestBackend, RestBackend>,
    profiles: RestBackend,
    path: &str,
) -> Result<()> {
    let kind = match resolve(path) {
        RouteAccess::Public => {
            println!("public: render {path}");
            return Ok(());
        }
        RouteAccess::Fallback => {
            print_redirect(&Redirect::to("/").replacing());
            return Ok(());
        }
        access => GuardKind::for_route(access).context("guarded route without a guard")?,
    };

    let guard = RouteGuard::new(sessions, profiles, kind);
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("loading...");
    let Some(state) = guard.check(&cancel).await else {
        bail!("check interrupted");
    };
    match state.view(kind, path) {
        GuardView::Render(profile) => println!("render {path} for {}", profile.full_name()),
        GuardView::Redirect(redirect) => print_redirect(&redirect),
        GuardView::Loading => bail!("guard did not resolve"),
    }
    Ok(())
}

fn print_redirect(redirect: &Redirect) {
    println!("redirect: {}", redirect.to);
    if let Some(from) = &redirect.from {
        println!("from:     {from}");
    }
    if let Some(message) = &redirect.message {
        println!("{message}");
    }
}
