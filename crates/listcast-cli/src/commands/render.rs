//! Render command.

use anyhow::{Result, bail};
use reqwest::StatusCode;
use serde_json::{Value, json};

use super::ApiClient;

pub async fn render(client: &ApiClient, listing_id: u64, variant: Option<String>) -> Result<()> {
    let body = request_body(listing_id, variant.as_deref());
    println!("Rendering listing {}...", listing_id);

    let (status, response) = client.post("/api/render", Some(&body)).await?;
    println!("{}", summarize(status, &response)?);
    Ok(())
}

fn request_body(listing_id: u64, variant: Option<&str>) -> Value {
    match variant {
        Some(variant) => json!({ "listingId": listing_id, "variant": variant }),
        None => json!({ "listingId": listing_id }),
    }
}

/// Turn a render response into a line for the user, or an error.
fn summarize(status: StatusCode, body: &Value) -> Result<String> {
    if status.is_success() {
        if body["cancelled"] == true {
            return Ok("Render was cancelled".to_string());
        }

        let output = body["output"].as_str().unwrap_or("(no output reported)");
        let mut summary = format!("Render finished: {}", output);
        if let Some(url) = body["externalUrl"].as_str() {
            summary.push_str(&format!("\nUploaded to: {}", url));
        }
        return Ok(summary);
    }

    match body["error"].as_str() {
        Some("pipeline_failed") => {
            let code = match body["code"].as_i64() {
                Some(code) => code.to_string(),
                None => "none".to_string(),
            };
            let logs = body["logs"].as_str().unwrap_or_default();
            bail!("pipeline failed (exit code {})\n{}", code, logs.trim_end())
        }
        Some(error) => {
            let message = body["message"].as_str().unwrap_or_default();
            bail!("{} ({}): {}", error, status, message)
        }
        None => bail!("unexpected response {}: {}", status, body),
    }
}
