//! Service configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use listcast_core::{ListingId, PipelineSpec, Variant};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment flag that keeps the pipeline from starting its preview server.
pub const PREVIEW_ENV: &str = "ENABLE_PREVIEW";

/// Full service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub job: JobConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

/// How the render pipeline is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Executable, e.g. `node`.
    pub program: String,
    /// Arguments placed before the script.
    pub args: Vec<String>,
    /// Pipeline entry script. When unset the program receives the job
    /// arguments directly.
    pub script: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: Vec::new(),
            script: Some(PathBuf::from("scripts/pipeline.mjs")),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Build the launch spec for one job: `<program> [args] [script] <listingId> <variant>`.
    pub fn spec_for(&self, listing_id: ListingId, variant: &Variant) -> PipelineSpec {
        let mut args = self.args.clone();
        if let Some(script) = &self.script {
            args.push(script.to_string_lossy().to_string());
        }
        args.push(listing_id.to_string());
        args.push(variant.to_string());

        let mut env = self.env.clone();
        env.insert(PREVIEW_ENV.to_string(), "0".to_string());

        PipelineSpec {
            program: self.program.clone(),
            args,
            env,
            working_dir: self.working_dir.clone(),
        }
    }
}

/// Job deadlines and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub timeout: Duration,
    /// Wait between the graceful and the forceful termination signal.
    pub grace: Duration,
    pub default_variant: String,
    pub log_limit_bytes: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            grace: Duration::from_millis(1500),
            default_variant: "default".to_string(),
            log_limit_bytes: listcast_core::DEFAULT_LOG_LIMIT_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        parse_service_config(&content)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be greater than zero"));
        }
        if self.pipeline.program.trim().is_empty() {
            return Err(ConfigError::MissingField("pipeline.program".to_string()));
        }
        if self.job.timeout.is_zero() {
            return Err(invalid("job.timeout-ms", "must be greater than zero"));
        }
        if self.job.default_variant.trim().is_empty() {
            return Err(invalid("job.default-variant", "must not be empty"));
        }
        Ok(())
    }
}

/// Parse a service configuration from KDL text.
///
/// Every node is optional; missing values keep their defaults.
pub fn parse_service_config(kdl: &str) -> ConfigResult<ServiceConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ServiceConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => parse_server(node, &mut config.server)?,
            "pipeline" => parse_pipeline(node, &mut config.pipeline)?,
            "job" => parse_job(node, &mut config.job)?,
            _ => {} // Ignore unknown nodes
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_server(node: &KdlNode, server: &mut ServerConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "host" => {
                server.host = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("server.host".to_string()))?;
            }
            "port" => {
                let port = get_first_int_arg(child, "server.port")?;
                server.port = u16::try_from(port)
                    .map_err(|_| invalid("server.port", format!("{} is out of range", port)))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_pipeline(node: &KdlNode, pipeline: &mut PipelineConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "program" => {
                pipeline.program = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("pipeline.program".to_string()))?;
            }
            "args" => pipeline.args = get_all_string_args(child),
            "script" => pipeline.script = get_first_string_arg(child).map(PathBuf::from),
            "working-dir" => pipeline.working_dir = get_first_string_arg(child).map(PathBuf::from),
            "env" => {
                for var in children(child) {
                    let key = var.name().value().to_string();
                    let value = get_first_string_arg(var).ok_or_else(|| {
                        invalid(format!("pipeline.env.{}", key), "expected a string value")
                    })?;
                    pipeline.env.insert(key, value);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_job(node: &KdlNode, job: &mut JobConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "timeout-ms" => {
                job.timeout = Duration::from_millis(get_positive_u64(child, "job.timeout-ms")?);
            }
            "grace-ms" => {
                let grace = get_first_int_arg(child, "job.grace-ms")?;
                let grace = u64::try_from(grace)
                    .map_err(|_| invalid("job.grace-ms", "must not be negative"))?;
                job.grace = Duration::from_millis(grace);
            }
            "default-variant" => {
                job.default_variant = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("job.default-variant".to_string()))?;
            }
            "log-limit-bytes" => {
                job.log_limit_bytes = get_positive_u64(child, "job.log-limit-bytes")? as usize;
            }
            _ => {}
        }
    }
    Ok(())
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_first_int_arg(node: &KdlNode, field: &str) -> ConfigResult<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?
        .value()
        .as_integer()
        .ok_or_else(|| invalid(field, "expected an integer"))
}

fn get_positive_u64(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = get_first_int_arg(node, field)?;
    match u64::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(invalid(field, "must be greater than zero")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_service_config("").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pipeline.program, "node");
        assert_eq!(config.job.timeout, Duration::from_secs(600));
        assert_eq!(config.job.grace, Duration::from_millis(1500));
        assert_eq!(config.job.default_variant, "default");
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            server {
                host "127.0.0.1"
                port 8080
            }

            pipeline {
                program "node"
                args "--enable-source-maps"
                script "scripts/pipeline.mjs"
                working-dir "/srv/listcast"
                env {
                    AWS_REGION "eu-central-1"
                }
            }

            job {
                timeout-ms 120000
                grace-ms 2000
                default-variant "bireysel"
                log-limit-bytes 4096
            }
        "#;

        let config = parse_service_config(kdl).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.args, vec!["--enable-source-maps"]);
        assert_eq!(
            config.pipeline.working_dir,
            Some(PathBuf::from("/srv/listcast"))
        );
        assert_eq!(
            config.pipeline.env.get("AWS_REGION").map(String::as_str),
            Some("eu-central-1")
        );
        assert_eq!(config.job.timeout, Duration::from_millis(120_000));
        assert_eq!(config.job.grace, Duration::from_millis(2000));
        assert_eq!(config.job.default_variant, "bireysel");
        assert_eq!(config.job.log_limit_bytes, 4096);
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let kdl = r#"
            telemetry { endpoint "http://collector" }
            server { port 5000 }
        "#;
        let config = parse_service_config(kdl).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = parse_service_config("job { timeout-ms 0 }").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        let err = parse_service_config("server { port 70000 }").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_string_timeout() {
        let err = parse_service_config(r#"job { timeout-ms "soon" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_empty_program() {
        let err = parse_service_config(r#"pipeline { program "" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_service_config("server {").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_spec_for_job() {
        let pipeline = PipelineConfig::default();
        let spec = pipeline.spec_for(ListingId::new(42).unwrap(), &Variant::new("kurumsal"));

        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["scripts/pipeline.mjs", "42", "kurumsal"]);
        assert_eq!(spec.env.get(PREVIEW_ENV).map(String::as_str), Some("0"));
    }

    #[test]
    fn test_spec_without_script() {
        let pipeline = PipelineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo $1".to_string(), "render".to_string()],
            script: None,
            ..Default::default()
        };
        let spec = pipeline.spec_for(ListingId::new(7).unwrap(), &Variant::new("default"));
        assert_eq!(spec.args, vec!["-c", "echo $1", "render", "7", "default"]);
    }

    #[test]
    fn test_preview_flag_wins_over_configured_env() {
        let mut pipeline = PipelineConfig::default();
        pipeline
            .env
            .insert(PREVIEW_ENV.to_string(), "1".to_string());
        pipeline
            .env
            .insert("AWS_REGION".to_string(), "eu-central-1".to_string());
        let spec = pipeline.spec_for(ListingId::new(1).unwrap(), &Variant::new("default"));
        assert_eq!(spec.env.get(PREVIEW_ENV).map(String::as_str), Some("0"));
        assert_eq!(spec.env.get("AWS_REGION").map(String::as_str), Some("eu-central-1"));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = ServiceConfig::load("/definitely/not/listcast.kdl").unwrap_err();
        match err {
            ConfigError::Read { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/not/listcast.kdl"))
            }
            other => panic!("Expected Read error, got {:?}", other),
        }
    }
}
