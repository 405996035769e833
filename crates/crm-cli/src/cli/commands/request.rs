//! Authenticated calls to domain resources.

use anyhow::{Context, Result, bail};
use crm_core::api::{ApiRequest, Method};
use crm_core::navigation::Route;
use serde_json::Value;

use super::{App, explain};

pub async fn run(app: &App, method: &str, path: &str, data: Option<&str>) -> Result<()> {
    let method = parse_method(method)?;

    // Paths that name a front-end view go through the same guard as the view.
    if let Some(route) = Route::from_path(path)
        && !app.enter(route).await
    {
        match app.history.last() {
            Some(Route::Dashboard) => bail!("{path} requires an admin session."),
            _ => bail!("Not logged in. Run `crm login --email <EMAIL>`."),
        }
    }

    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.with_body(body);
    }

    let response = app
        .controller
        .api()
        .send(request)
        .await
        .map_err(explain)?;

    tracing::debug!(status = response.status, path, "request completed");
    print_body(&response.body)
}

fn parse_method(method: &str) -> Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => Method::from_bytes(upper.as_bytes())
            .with_context(|| format!("invalid HTTP method '{method}'")),
        _ => bail!("Unsupported HTTP method '{method}' (expected GET, POST, PUT, PATCH or DELETE)"),
    }
}

fn print_body(body: &Value) -> Result<()> {
    match body {
        Value::Null => {}
        Value::String(text) => println!("{text}"),
        other => println!(
            "{}",
            serde_json::to_string_pretty(other).context("format response")?
        ),
    }
    Ok(())
}
