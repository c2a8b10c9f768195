// config.rs
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("production") {
            MpesaEnvironment::Production
        } else {
            MpesaEnvironment::Sandbox
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "sandbox",
            MpesaEnvironment::Production => "production",
        }
    }

    fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

/// Which transport the composing application wires into the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    /// For hosts without push/SMS capability, e.g. desktop previews.
    Simulated,
}

impl TransportKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "simulated" => Ok(TransportKind::Simulated),
            other => Err(AppError::configuration(format!(
                "MPESA_TRANSPORT must be 'http' or 'simulated', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaUrls {
    pub auth_url: String,
    pub stk_push_url: String,
    pub stk_query_url: String,
}

#[derive(Debug)]
pub struct MpesaConfig {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub api_key: Option<SecretString>,
    pub short_code: String,
    pub passkey: SecretString,
    pub callback_url: String,
    pub environment: MpesaEnvironment,
    pub base_url: String,
    pub transport: TransportKind,
    pub request_timeout: Duration,
    pub query_retries: u32,
}

impl MpesaConfig {
    pub fn urls(&self) -> MpesaUrls {
        let base_url = self.base_url.trim_end_matches('/');
        MpesaUrls {
            auth_url: format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url),
            stk_push_url: format!("{}/mpesa/stkpush/v1/processrequest", base_url),
            stk_query_url: format!("{}/mpesa/stkpushquery/v1/query", base_url),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == MpesaEnvironment::Production
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub mpesa: MpesaConfig,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };
        let secret = |key: &str| required(key).map(SecretString::new);

        let environment = MpesaEnvironment::parse(
            &lookup("MPESA_ENVIRONMENT").unwrap_or_else(|| "sandbox".to_string()),
        );
        let base_url = lookup("MPESA_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| environment.base_url().to_string());
        let transport = match lookup("MPESA_TRANSPORT") {
            Some(raw) => TransportKind::parse(&raw)?,
            None => TransportKind::Http,
        };

        let mpesa = MpesaConfig {
            consumer_key: secret("MPESA_CONSUMER_KEY")?,
            consumer_secret: secret("MPESA_CONSUMER_SECRET")?,
            api_key: lookup("MPESA_API_KEY")
                .filter(|key| !key.is_empty())
                .map(SecretString::new),
            short_code: required("MPESA_SHORT_CODE")?,
            passkey: secret("MPESA_PASSKEY")?,
            callback_url: required("MPESA_CALLBACK_URL")?,
            environment,
            base_url,
            transport,
            request_timeout: Duration::from_secs(parse_number(&lookup, "MPESA_TIMEOUT_SECS", 30)?),
            query_retries: parse_number(&lookup, "MPESA_QUERY_RETRIES", 2)?,
        };

        Ok(AppConfig {
            mpesa,
            port: parse_number(&lookup, "PORT", 3000)?,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        })
    }

    pub fn config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.mpesa.environment.as_str(),
            "is_production": self.mpesa.is_production(),
            "base_url": self.mpesa.base_url,
            "business_shortcode": self.mpesa.short_code,
            "callback_url": self.mpesa.callback_url,
            "transport": format!("{:?}", self.mpesa.transport).to_lowercase(),
            "consumer_key_set": !self.mpesa.consumer_key.expose_secret().is_empty(),
            "consumer_secret_set": !self.mpesa.consumer_secret.expose_secret().is_empty(),
            "api_key_set": self.mpesa.api_key.is_some(),
            "passkey_set": !self.mpesa.passkey.expose_secret().is_empty(),
            "port": self.port,
            "host": self.host,
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} must be a number", key))),
        None => Ok(default),
    }
}
