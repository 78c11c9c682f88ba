//! Cancel and health commands.

use anyhow::{Result, bail};

use super::ApiClient;

pub async fn cancel(client: &ApiClient) -> Result<()> {
    let (status, body) = client.post("/api/cancel", None).await?;
    if !status.is_success() {
        bail!("cancel failed ({}): {}", status, body);
    }

    if body["cancelled"] == true {
        println!("Cancelled the active render");
    } else {
        println!("{}", body["message"].as_str().unwrap_or("No active job"));
    }
    Ok(())
}

pub async fn health(client: &ApiClient) -> Result<()> {
    let (status, body) = client.get("/health/ready").await?;
    if !status.is_success() || body["ok"] != true {
        bail!("server unhealthy ({}): {}", status, body);
    }

    let state = if body["busy"] == true { "busy" } else { "idle" };
    println!("Server is up ({})", state);
    Ok(())
}
