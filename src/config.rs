use crate::admin::{AdminPassword, DEFAULT_ADMIN_PASSWORD};
use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where rows and files live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// DynamoDB tables plus an S3 bucket.
    Aws,
    /// Process-local tables and object store. Nothing survives a restart.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend '{}', expected 'aws' or 'memory'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub backend: BackendKind,
    pub meme_bucket_name: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub memes_table: String,
    pub comments_table: String,
    pub likes_table: String,
    /// Prefix of every public object URL; the object key is appended after a `/`.
    pub storage_public_url: String,
    /// Substring identifying media URLs served from our own storage.
    pub storage_domain: String,
    pub admin_password: AdminPassword,
    /// Page URL handed out by the share action.
    pub page_url: String,
    /// Create tables and bucket on startup.
    pub init_resources: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is fine; a malformed one is not.
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!(".env file loaded from path: {}", path.display()),
            Err(e) if e.not_found() => tracing::debug!(".env file not found, relying on environment variables"),
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `load` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let backend = BackendKind::from_str(&var_or("BOARD_BACKEND", "aws"))
            .map_err(|e| ConfigError::InvalidVar("BOARD_BACKEND".into(), e))?;

        let meme_bucket_name = var_or("MEME_BUCKET_NAME", "memes");
        let aws_region = var_or("AWS_DEFAULT_REGION", "ca-central-1");
        let localstack_endpoint = lookup("AWS_ENDPOINT_URL").filter(|v| !v.trim().is_empty());

        let page_url = var_or("BOARD_PAGE_URL", "http://localhost:3000/");
        url::Url::parse(&page_url)
            .map_err(|e| ConfigError::InvalidVar("BOARD_PAGE_URL".into(), e.to_string()))?;

        let storage_public_url = match lookup("STORAGE_PUBLIC_URL") {
            Some(explicit) => explicit,
            None => match (backend, &localstack_endpoint) {
                (BackendKind::Memory, _) => format!("{}/media", page_url.trim_end_matches('/')),
                (BackendKind::Aws, Some(endpoint)) => {
                    format!("{}/{}", endpoint.trim_end_matches('/'), meme_bucket_name)
                }
                (BackendKind::Aws, None) => {
                    format!("https://{}.s3.{}.amazonaws.com", meme_bucket_name, aws_region)
                }
            },
        };
        let storage_public_url = storage_public_url.trim_end_matches('/').to_string();
        let public_host = url::Url::parse(&storage_public_url)
            .map_err(|e| ConfigError::InvalidVar("STORAGE_PUBLIC_URL".into(), e.to_string()))?
            .host_str()
            .map(|h| h.to_string())
            .ok_or_else(|| ConfigError::InvalidVar("STORAGE_PUBLIC_URL".into(), "URL has no host".into()))?;

        let storage_domain = lookup("STORAGE_DOMAIN").unwrap_or(public_host);
        if storage_domain.trim().is_empty() {
            return Err(ConfigError::InvalidVar("STORAGE_DOMAIN".into(), "must not be empty".into()));
        }

        let init_resources = match var_or("INIT_RESOURCES", "true").to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => {
                return Err(ConfigError::InvalidVar("INIT_RESOURCES".into(), other.to_string()));
            }
        };

        Ok(Config {
            bind_address,
            backend,
            meme_bucket_name,
            aws_region,
            localstack_endpoint,
            memes_table: var_or("MEMES_TABLE", "memes"),
            comments_table: var_or("COMMENTS_TABLE", "comments"),
            likes_table: var_or("LIKES_TABLE", "likes"),
            storage_public_url,
            storage_domain,
            admin_password: AdminPassword::new(var_or("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD)),
            page_url,
            init_resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_target_aws() {
        let config = load(&[]).unwrap();
        assert_eq!(config.backend, BackendKind::Aws);
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.meme_bucket_name, "memes");
        assert_eq!(config.storage_public_url, "https://memes.s3.ca-central-1.amazonaws.com");
        assert_eq!(config.storage_domain, "memes.s3.ca-central-1.amazonaws.com");
        assert!(config.admin_password.matches("367098"));
        assert!(config.init_resources);
    }

    #[test]
    fn localstack_endpoint_builds_path_style_urls() {
        let config = load(&[("AWS_ENDPOINT_URL", "http://localhost:4566/")]).unwrap();
        assert_eq!(config.storage_public_url, "http://localhost:4566/memes");
        assert_eq!(config.storage_domain, "localhost");
    }

    #[test]
    fn memory_backend_serves_media_from_the_board() {
        let config = load(&[
            ("BOARD_BACKEND", "memory"),
            ("BOARD_PAGE_URL", "http://board.local:8080/"),
            ("STORAGE_DOMAIN", "board.local"),
        ])
        .unwrap();
        assert_eq!(config.storage_public_url, "http://board.local:8080/media");
        assert_eq!(config.storage_domain, "board.local");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(load(&[("BIND_ADDRESS", "nope")]), Err(ConfigError::InvalidVar(k, _)) if k == "BIND_ADDRESS"));
        assert!(matches!(load(&[("BOARD_BACKEND", "sqlite")]), Err(ConfigError::InvalidVar(k, _)) if k == "BOARD_BACKEND"));
        assert!(matches!(load(&[("INIT_RESOURCES", "maybe")]), Err(ConfigError::InvalidVar(k, _)) if k == "INIT_RESOURCES"));
    }
}
