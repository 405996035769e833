//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use crm_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "crm")]
#[command(version = "0.1")]
#[command(about = "Terminal client for the CRM admin API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the API base URL for this invocation
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,

        /// Password (read from stdin when omitted)
        #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Create a user account (admin only)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Password for the new account (read from stdin when omitted)
        #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long, value_enum)]
        role: commands::auth::RoleArg,
    },

    /// First-run administrator setup
    Bootstrap {
        #[command(subcommand)]
        command: BootstrapCommands,
    },

    /// Send an authenticated request and print the JSON response
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        #[arg(value_name = "METHOD")]
        method: String,

        /// Path relative to the API base URL, e.g. /leads
        #[arg(value_name = "PATH")]
        path: String,

        /// JSON request body
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },

    /// Shorthand for `request GET <PATH>`
    Get {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum BootstrapCommands {
    /// Check whether the first administrator can still be created
    Check,
    /// Create the first administrator
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Persist the API base URL
    SetUrl {
        #[arg(value_name = "URL")]
        url: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::load().context("load config")?;
    if let Some(url) = cli.api_url.as_deref() {
        config.api_url = url.trim().to_string();
    }

    // Flushes the log file on drop.
    let _log_guard = logging::init(&config.log).context("init logging")?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli.command, &config).await })
}

async fn dispatch(command: Commands, config: &config::Config) -> Result<()> {
    match command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetUrl { url } => commands::config::set_url(&url),
        },

        Commands::Login { email, password } => {
            let app = commands::App::open(config)?;
            commands::auth::login(&app, &email, password).await
        }
        Commands::Logout => {
            let app = commands::App::open(config)?;
            commands::auth::logout(&app).await
        }
        Commands::Whoami => {
            let app = commands::App::open(config)?;
            commands::auth::whoami(&app).await
        }
        Commands::Register {
            name,
            email,
            password,
            role,
        } => {
            let app = commands::App::open(config)?;
            commands::auth::register(&app, name, &email, password, role.into()).await
        }

        Commands::Bootstrap { command } => {
            let app = commands::App::open(config)?;
            match command {
                BootstrapCommands::Check => commands::auth::bootstrap_check(&app).await,
                BootstrapCommands::Create {
                    name,
                    email,
                    password,
                } => commands::auth::bootstrap_create(&app, name, &email, password).await,
            }
        }

        Commands::Request { method, path, data } => {
            let app = commands::App::open(config)?;
            commands::request::run(&app, &method, &path, data.as_deref()).await
        }
        Commands::Get { path } => {
            let app = commands::App::open(config)?;
            commands::request::run(&app, "GET", &path, None).await
        }
    }
}
