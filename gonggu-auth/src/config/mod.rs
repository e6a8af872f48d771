use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub allowed_origins: Vec<String>,
    pub firebase: FirebaseConfig,
    pub session: SessionConfig,
    pub kakao: KakaoConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Service-account credentials for the credential and profile stores.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub client_email: String,
    pub private_key: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Owner allow-list. Empty means unconfigured.
    pub owner_uids: Vec<String>,
    pub expires_days: i64,
}

#[derive(Debug, Clone)]
pub struct KakaoConfig {
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: Option<String>,
    pub webhook_audience: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("gonggu-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            firebase: FirebaseConfig {
                project_id: get_env("FIREBASE_PROJECT_ID", None, is_prod)?,
                client_email: get_env("FIREBASE_CLIENT_EMAIL", None, is_prod)?,
                private_key: Secret::new(normalize_private_key(&get_env(
                    "FIREBASE_PRIVATE_KEY",
                    None,
                    is_prod,
                )?)),
            },
            session: SessionConfig {
                owner_uids: parse_owner_uids(&get_optional_env("OWNER_UIDS").unwrap_or_default()),
                expires_days: get_env("SESSION_EXPIRES_DAYS", Some("7"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "SESSION_EXPIRES_DAYS must be a number: {}",
                            e
                        ))
                    })?,
            },
            kakao: KakaoConfig {
                client_id: get_env("KAKAO_CLIENT_ID", None, is_prod)?,
                client_secret: get_optional_env("KAKAO_CLIENT_SECRET").map(Secret::new),
                redirect_uri: get_optional_env("KAKAO_REDIRECT_URI"),
                webhook_audience: get_optional_env("KAKAO_WEBHOOK_AUDIENCE"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Prod
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.session.expires_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_EXPIRES_DAYS must be positive"
            )));
        }

        if self.session.owner_uids.is_empty() {
            tracing::warn!("OWNER_UIDS is not set; owner sessions cannot be issued");
        }

        if self.kakao.webhook_audience.is_none() {
            tracing::warn!("KAKAO_WEBHOOK_AUDIENCE is not set; webhook audience check is disabled");
        }

        if self.environment == Environment::Prod
            && self.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

/// Undo the escaping a PEM picks up in env files: surrounding quotes and
/// literal `\n` sequences.
pub fn normalize_private_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.replace("\\n", "\n")
}

/// Comma-separated uids, trimmed, blanks dropped.
pub fn parse_owner_uids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None if is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required in production but not set",
                key
            ))),
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}
