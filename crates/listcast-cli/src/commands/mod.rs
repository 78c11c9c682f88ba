//! CLI command implementations.

pub mod render;
pub mod service;

use anyhow::{Context, Result};
use listcast_config::ServiceConfig;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Thin JSON client for the server's HTTP surface.
///
/// No request timeout: a render holds its request open until it finishes.
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let mut base = Url::parse(api_url).with_context(|| format!("invalid API URL {api_url}"))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid endpoint {path}"))
    }

    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        read_json(response).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<(StatusCode, Value)> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let mut request = self.http.post(url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let bytes = response.bytes().await.context("failed to read response body")?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).context("server returned invalid JSON")?
    };
    Ok((status, body))
}

pub fn validate(path: &str) -> Result<()> {
    let config = ServiceConfig::load(path).with_context(|| format!("failed to load {path}"))?;
    config
        .validate()
        .with_context(|| format!("{path} is not a valid configuration"))?;

    println!("Configuration is valid");
    println!("  listen:   {}:{}", config.server.host, config.server.port);
    println!("  program:  {}", config.pipeline.program);
    if let Some(script) = &config.pipeline.script {
        println!("  script:   {}", script.display());
    }
    println!("  timeout:  {}ms", config.job.timeout.as_millis());
    println!("  grace:    {}ms", config.job.grace.as_millis());
    println!("  variant:  {}", config.job.default_variant);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let client = ApiClient::new("http://localhost:4000").unwrap();
        assert_eq!(
            client.endpoint("/api/render").unwrap().as_str(),
            "http://localhost:4000/api/render"
        );

        let client = ApiClient::new("https://render.example.com/listcast").unwrap();
        assert_eq!(
            client.endpoint("/api/cancel").unwrap().as_str(),
            "https://render.example.com/listcast/api/cancel"
        );
    }

    #[test]
    fn test_invalid_api_url() {
        assert!(ApiClient::new("not a url").is_err());
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        assert!(validate("/definitely/not/here.kdl").is_err());
    }

    #[test]
    fn test_validate_accepts_config() {
        let path = std::env::temp_dir().join(format!("listcast-cli-{}.kdl", std::process::id()));
        std::fs::write(&path, "job { timeout-ms 1000 }\n").unwrap();

        let result = validate(path.to_str().unwrap());
        let _ = std::fs::remove_file(&path);
        assert!(result.is_ok());
    }
}
