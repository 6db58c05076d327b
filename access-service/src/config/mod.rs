use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

const DEV_JWT_SECRET: &str = "dev-only-change-me";

/// STS AssumeRole duration bounds.
pub const MIN_SESSION_SECONDS: i32 = 900;
pub const MAX_SESSION_SECONDS: i32 = 43_200;

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub mfa: MfaConfig,
    pub federation: FederationConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => f.write_str("dev"),
            Environment::Prod => f.write_str("prod"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Signing material for session tokens. Loaded once at startup.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub provisional_expiry_minutes: i64,
    pub trusted_expiry_minutes: i64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("provisional_expiry_minutes", &self.provisional_expiry_minutes)
            .field("trusted_expiry_minutes", &self.trusted_expiry_minutes)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    pub region: String,
    pub signin_url: String,
    pub console_destination: String,
    pub issuer: String,
    pub default_session_seconds: i32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Peers whose `x-forwarded-for` is believed. Empty means none.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub signup_attempts: u32,
    pub signup_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("access-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            token: TokenConfig {
                secret: get_env("JWT_SECRET", Some(DEV_JWT_SECRET), is_prod)?,
                provisional_expiry_minutes: parse_env(
                    "PROVISIONAL_TOKEN_EXPIRY_MINUTES",
                    "10",
                    is_prod,
                )?,
                trusted_expiry_minutes: parse_env("TRUSTED_TOKEN_EXPIRY_MINUTES", "1440", is_prod)?,
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("ZeroTrustApp"), is_prod)?,
            },
            federation: FederationConfig {
                region: get_env("AWS_REGION", Some("us-east-1"), is_prod)?,
                signin_url: get_env(
                    "AWS_SIGNIN_URL",
                    Some("https://signin.aws.amazon.com/federation"),
                    is_prod,
                )?,
                console_destination: get_env(
                    "AWS_CONSOLE_DESTINATION",
                    Some("https://console.aws.amazon.com/"),
                    is_prod,
                )?,
                issuer: get_env(
                    "AWS_FEDERATION_ISSUER",
                    Some("https://zero-trust-console.local"),
                    is_prod,
                )?,
                default_session_seconds: parse_env("AWS_SESSION_DEFAULT_SECONDS", "3600", is_prod)?,
                timeout_seconds: parse_env("AWS_FEDERATION_TIMEOUT_SECONDS", "10", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                trusted_proxies: parse_list_env("TRUSTED_PROXIES")?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                signup_attempts: parse_env("RATE_LIMIT_SIGNUP_ATTEMPTS", "3", is_prod)?,
                signup_window_seconds: parse_env(
                    "RATE_LIMIT_SIGNUP_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.token.provisional_expiry_minutes <= 0 || self.token.trusted_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "token expiry minutes must be positive"
            )));
        }

        if self.token.secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }

        if !(MIN_SESSION_SECONDS..=MAX_SESSION_SECONDS)
            .contains(&self.federation.default_session_seconds)
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "AWS_SESSION_DEFAULT_SECONDS must be between {} and {}",
                MIN_SESSION_SECONDS,
                MAX_SESSION_SECONDS
            )));
        }

        if self.federation.timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "AWS_FEDERATION_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.token.secret == DEV_JWT_SECRET {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be set to a non-default value in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

/// Optional comma-separated list; unset or empty yields an empty list.
fn parse_list_env<T>(key: &str) -> Result<Vec<T>, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
        })
        .collect()
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AccessConfig {
    AccessConfig {
        common: core_config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        token: TokenConfig {
            secret: "test-secret".to_string(),
            provisional_expiry_minutes: 10,
            trusted_expiry_minutes: 60,
        },
        mfa: MfaConfig {
            issuer: "ZeroTrustApp".to_string(),
        },
        federation: FederationConfig {
            region: "us-east-1".to_string(),
            signin_url: "https://signin.aws.amazon.com/federation".to_string(),
            console_destination: "https://console.aws.amazon.com/".to_string(),
            issuer: "https://zero-trust-console.local".to_string(),
            default_session_seconds: 3600,
            timeout_seconds: 10,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            trusted_proxies: Vec::new(),
        },
        rate_limit: RateLimitConfig {
            login_attempts: 5,
            login_window_seconds: 900,
            signup_attempts: 3,
            signup_window_seconds: 3600,
            global_ip_limit: 100,
            global_ip_window_seconds: 60,
        },
    }
}
