//! Session command handlers: login, logout, whoami, register, bootstrap.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use crm_core::api::{BootstrapRequest, RegisterRequest};
use crm_core::navigation::Route;
use crm_core::session::{Role, mask_token};

use super::{App, explain};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum RoleArg {
    Admin,
    Agent,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Role::Admin,
            RoleArg::Agent => Role::Agent,
        }
    }
}

pub async fn login(app: &App, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };
    if password.is_empty() {
        bail!("Password is required");
    }

    let payload = app
        .controller
        .login(email.trim(), &password)
        .await
        .context("Login failed")?;

    println!("Logged in as {}", payload.user);
    println!("Access token: {}", mask_token(&payload.access_token));
    if payload.refresh_token.is_none() {
        println!("Warning: no refresh token issued; you will need to log in again when the access token expires.");
    }
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    let was_signed_in = app.controller.current_user().is_some();
    app.controller.logout().await;

    if was_signed_in {
        println!("Logged out.");
    } else {
        println!("Not logged in; cleared any stored credentials.");
    }
    Ok(())
}

pub async fn whoami(app: &App) -> Result<()> {
    if !app.enter(Route::Dashboard).await {
        bail!("Not logged in. Run `crm login --email <EMAIL>`.");
    }
    let Some(user) = app.controller.current_user() else {
        bail!("Not logged in. Run `crm login --email <EMAIL>`.");
    };

    println!("{user}");
    println!("  id:   {}", user.id);
    println!("  role: {}", user.role);

    let store = app.controller.session().store();
    if let Some(token) = store.access_token() {
        println!("  access token:  {}", mask_token(&token));
    }
    if let Some(token) = store.refresh_token() {
        println!("  refresh token: {}", mask_token(&token));
    }
    if let Some(location) = store.location() {
        println!("  stored in: {}", location.display());
    }
    Ok(())
}

pub async fn register(
    app: &App,
    name: String,
    email: &str,
    password: Option<String>,
    role: Role,
) -> Result<()> {
    if !app.enter(Route::Register).await {
        if app.history.last() == Some(Route::Dashboard) {
            bail!("Registering users requires an admin session.");
        }
        if app.controller.bootstrap_status().await {
            bail!("Not logged in. No administrator exists yet; run `crm bootstrap create` first.");
        }
        bail!("Not logged in. Run `crm login --email <EMAIL>` with an admin account.");
    }

    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let request = RegisterRequest {
        name,
        email: email.trim().to_string(),
        password,
        role,
    };
    let body = app
        .controller
        .register_user(&request)
        .await
        .map_err(explain)
        .context("Registration failed")?;

    println!("Created {} account for {}", request.role, request.email);
    print_user_id(&body);
    Ok(())
}

pub async fn bootstrap_check(app: &App) -> Result<()> {
    if app.controller.bootstrap_status().await {
        println!("No administrator exists yet. Run `crm bootstrap create` to set one up.");
    } else {
        println!("Bootstrap is closed.");
    }
    Ok(())
}

pub async fn bootstrap_create(
    app: &App,
    name: String,
    email: &str,
    password: String,
) -> Result<()> {
    let request = BootstrapRequest {
        name,
        email: email.trim().to_string(),
        password,
    };
    let body = app
        .controller
        .bootstrap_admin(&request)
        .await
        .map_err(explain)
        .context("Bootstrap failed")?;

    println!("Administrator {} created.", request.email);
    print_user_id(&body);
    println!("Log in with `crm login --email {}`.", request.email);
    Ok(())
}

fn print_user_id(body: &serde_json::Value) {
    let id = body
        .get("user")
        .unwrap_or(body)
        .get("id")
        .or_else(|| body.get("_id"))
        .and_then(serde_json::Value::as_str);
    if let Some(id) = id {
        println!("  id: {id}");
    }
}

fn read_password() -> Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
