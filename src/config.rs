use clap::Parser;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::Level;
use url::Url;

use crate::auth::BootstrapAdmin;

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long)]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
struct Config {
    database_url: String,
    log_level: Option<LogLevel>,
}

/// Secret credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
struct Secrets {
    bootstrap_admin: BootstrapAdminSecrets,
    payment: PaymentSecrets,
}

#[derive(Deserialize)]
struct BootstrapAdminSecrets {
    email: String,
    password: String,
}

/// Provider type tag and all payment credentials.
/// Deserialized from the `[payment]` section of the secrets TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum PaymentSecrets {
    Vipps {
        client_id: String,
        client_secret: String,
        subscription_key: String,
        merchant_serial_number: String,
        api_base_url: Option<Url>,
    },
    Stripe {
        secret_key: String,
        api_base_url: Option<Url>,
    },
    Mock,
}

// ===== Runtime types (assembled from Config + Secrets) =====

/// Combined runtime context. Assembled once at startup and injected
/// into the services that need it; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub(crate) database_url: String,
    pub log_level: LogLevel,
    pub bootstrap_admin: BootstrapAdmin,
    pub payment: PaymentConfig,
}

/// Runtime payment-provider configuration assembled from `PaymentSecrets`.
#[derive(Debug, Clone)]
pub enum PaymentConfig {
    Vipps(VippsAuth),
    Stripe(StripeAuth),
    Mock,
}

/// Vipps ePayment credentials.
#[derive(Debug, Clone)]
pub struct VippsAuth {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) subscription_key: String,
    pub(crate) merchant_serial_number: String,
    pub(crate) api_base_url: Option<Url>,
}

/// Stripe API credentials.
#[derive(Debug, Clone)]
pub struct StripeAuth {
    pub(crate) secret_key: String,
    pub(crate) api_base_url: Option<Url>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

pub(crate) async fn configure_sqlite_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePool::connect(database_url).await?;

    // WAL allows concurrent readers while a writer holds the lock.
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    // Wait up to 10 seconds on a blocked write before failing with
    // "database is locked". Transactions are short, so contention
    // resolves well within this window.
    sqlx::query("PRAGMA busy_timeout = 10000")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    Ok(pool)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
}

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        let payment = match secrets.payment {
            PaymentSecrets::Vipps {
                client_id,
                client_secret,
                subscription_key,
                merchant_serial_number,
                api_base_url,
            } => PaymentConfig::Vipps(VippsAuth {
                client_id,
                client_secret,
                subscription_key,
                merchant_serial_number,
                api_base_url,
            }),
            PaymentSecrets::Stripe {
                secret_key,
                api_base_url,
            } => PaymentConfig::Stripe(StripeAuth {
                secret_key,
                api_base_url,
            }),
            PaymentSecrets::Mock => PaymentConfig::Mock,
        };

        Ok(Self {
            database_url: config.database_url,
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            bootstrap_admin: BootstrapAdmin {
                email: secrets.bootstrap_admin.email,
                password: secrets.bootstrap_admin.password,
            },
            payment,
        })
    }

    pub async fn sqlite_pool(&self) -> Result<SqlitePool, sqlx::Error> {
        configure_sqlite_pool(&self.database_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_ctx() -> Ctx {
        Ctx::from_toml(
            r#"
            database_url = "sqlite::memory:"
            log_level = "debug"
            "#,
            r#"
            [bootstrap_admin]
            email = "admin"
            password = "adminpass"

            [payment]
            type = "mock"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_mock_payment_config() {
        let ctx = create_test_ctx();
        assert!(matches!(ctx.payment, PaymentConfig::Mock));
        assert_eq!(ctx.bootstrap_admin.email, "admin");
    }

    #[test]
    fn parses_vipps_payment_config() {
        let ctx = Ctx::from_toml(
            r#"database_url = "sqlite::memory:""#,
            r#"
            [bootstrap_admin]
            email = "admin"
            password = "adminpass"

            [payment]
            type = "vipps"
            client_id = "id"
            client_secret = "secret"
            subscription_key = "sub"
            merchant_serial_number = "123456"
            api_base_url = "https://apitest.vipps.no"
            "#,
        )
        .unwrap();

        let PaymentConfig::Vipps(auth) = ctx.payment else {
            panic!("expected vipps config");
        };
        assert_eq!(auth.merchant_serial_number, "123456");
        assert_eq!(
            auth.api_base_url.unwrap().as_str(),
            "https://apitest.vipps.no/"
        );
    }

    #[test]
    fn missing_bootstrap_admin_fails() {
        let result = Ctx::from_toml(
            r#"database_url = "sqlite::memory:""#,
            r#"
            [payment]
            type = "mock"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn log_level_defaults_to_info() {
        let ctx = Ctx::from_toml(
            r#"database_url = "sqlite::memory:""#,
            r#"
            [bootstrap_admin]
            email = "admin"
            password = "adminpass"

            [payment]
            type = "mock"
            "#,
        )
        .unwrap();
        assert!(matches!(ctx.log_level, LogLevel::Info));
    }
}
