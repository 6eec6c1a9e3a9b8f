//! Command-line definitions.

use aop_core::models::identity::Credentials;
use aop_core::models::profile::UserRole;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "aop", version, about = "Academic Ordering Platform session client")]
pub struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Public origin of the web app, used in password-reset links.
    #[arg(long, env = "AOP_APP_ORIGIN", global = true)]
    pub app_origin: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in as a client or writer.
    SignIn(SignInArgs),
    /// Sign in as an admin.
    AdminSignIn(SignInArgs),
    /// Register a client or writer account.
    Register(RegisterArgs),
    /// Register an admin account.
    RegisterAdmin(AdminRegisterArgs),
    /// Send a password-reset e-mail.
    ResetPassword {
        #[arg(long)]
        email: String,
        /// Reset an admin account.
        #[arg(long)]
        admin: bool,
    },
    /// End the current session and sign out.
    SignOut,
    /// Run the guard protecting PATH and print what the page would show.
    Check { path: String },
    /// Validate the current session and print its row.
    Session,
}

#[derive(Debug, Args)]
pub struct CredentialArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "AOP_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl CredentialArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.trim(), self.password.clone())
    }
}

#[derive(Debug, Args)]
pub struct SignInArgs {
    #[command(flatten)]
    pub credentials: CredentialArgs,
    /// Persist the credential across runs.
    #[arg(long)]
    pub remember: bool,
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub credentials: CredentialArgs,
    #[arg(long)]
    pub name: String,
    #[arg(long, value_enum, default_value_t = RoleArg::Client)]
    pub role: RoleArg,
}

#[derive(Debug, Args)]
pub struct AdminRegisterArgs {
    #[command(flatten)]
    pub credentials: CredentialArgs,
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Client,
    Writer,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Client => UserRole::Client,
            RoleArg::Writer => UserRole::Writer,
        }
    }
}
