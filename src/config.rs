//! Process configuration (SPEC_FULL §10.3, spec §6). Bound from CLI flags
//! and environment variables via `clap`'s derive + `env` features, the
//! same pattern `empathctl` uses elsewhere in this codebase.

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    None,
    StartTls,
    Ssl,
}

impl std::str::FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "ssl" => Ok(Self::Ssl),
            other => Err(format!("unknown SMTP_SECURITY value: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpAuth {
    Plain,
    Gmail,
    OAuth2,
}

impl std::str::FromStr for SmtpAuth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "gmail" => Ok(Self::Gmail),
            "oauth2" => Ok(Self::OAuth2),
            other => Err(format!("unknown SMTP_AUTH value: {other}")),
        }
    }
}

/// Durable email-dispatch worker: consumes form-submission events, renders
/// them, and delivers them via SMTP with retry and dead-letter handling.
#[derive(Parser, Debug, Clone)]
#[command(name = "mailer")]
#[command(about = "Durable email-dispatch worker for form-submission events", long_about = None)]
#[command(version)]
pub struct Config {
    /// Run as the retry-stream consumer instead of the primary consumer.
    #[arg(long)]
    pub retrier: bool,

    /// Override LOG_LEVEL for this run.
    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, env = "POCKETBASE_URL")]
    pub pocketbase_url: String,
    #[arg(long, env = "POCKETBASE_EMAIL")]
    pub pocketbase_email: String,
    #[arg(long, env = "POCKETBASE_PASS")]
    pub pocketbase_pass: String,

    #[arg(long, env = "SMTP_HOSTNAME")]
    pub smtp_hostname: String,
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,
    #[arg(long, env = "SMTP_SECURITY", default_value = "starttls")]
    pub smtp_security: String,
    #[arg(long, env = "SMTP_AUTH", default_value = "plain")]
    pub smtp_auth: String,
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: String,
    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: String,
    #[arg(long, env = "SMTP_PRIVATE_KEY")]
    pub smtp_private_key: Option<String>,
    #[arg(long, env = "SMTP_ACCESS_URL")]
    pub smtp_access_url: Option<String>,
    #[arg(long, env = "SMTP_POOL", default_value_t = false)]
    pub smtp_pool: bool,

    #[arg(long, env = "MINIO_ROOT_USER")]
    pub minio_root_user: String,
    #[arg(long, env = "MINIO_ROOT_PASSWORD")]
    pub minio_root_password: String,
    #[arg(long, env = "MINIO_ENDPOINT", default_value = "http://127.0.0.1:9000")]
    pub minio_endpoint: String,
    #[arg(long, env = "MINIO_BUCKET", default_value = "attachments")]
    pub minio_bucket: String,
    #[arg(long, env = "MINIO_REGION", default_value = "us-east-1")]
    pub minio_region: String,

    #[arg(long, env = "CONSUMER_BATCH_SIZE", default_value_t = 5)]
    pub consumer_batch_size: u32,
    #[arg(long, env = "CONSUMER_BLOCK", default_value_t = 10)]
    pub consumer_block: u64,
    #[arg(long, env = "RETRY_INTERVAL", default_value_t = 15)]
    pub retry_interval: u32,
    #[arg(long, env = "MAILER_RETRIES", default_value_t = 5)]
    pub mailer_retries: u32,

    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,
}

impl Config {
    #[must_use]
    pub fn smtp_security(&self) -> SmtpSecurity {
        self.smtp_security.parse().unwrap_or(SmtpSecurity::StartTls)
    }

    #[must_use]
    pub fn smtp_auth(&self) -> SmtpAuth {
        self.smtp_auth.parse().unwrap_or(SmtpAuth::Plain)
    }

    #[must_use]
    pub const fn mode(&self) -> crate::mode::Mode {
        if self.retrier {
            crate::mode::Mode::Retry
        } else {
            crate::mode::Mode::Primary
        }
    }

    #[must_use]
    pub const fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(self.retry_interval, self.mailer_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_security_parses_known_values() {
        assert_eq!("none".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::None);
        assert_eq!("starttls".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::StartTls);
        assert_eq!("ssl".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::Ssl);
        assert!("bogus".parse::<SmtpSecurity>().is_err());
    }

    #[test]
    fn smtp_auth_parses_known_values() {
        assert_eq!("plain".parse::<SmtpAuth>().unwrap(), SmtpAuth::Plain);
        assert_eq!("gmail".parse::<SmtpAuth>().unwrap(), SmtpAuth::Gmail);
        assert_eq!("oauth2".parse::<SmtpAuth>().unwrap(), SmtpAuth::OAuth2);
        assert!("bogus".parse::<SmtpAuth>().is_err());
    }

    #[test]
    fn mode_reflects_retrier_flag() {
        let config = Config::parse_from([
            "mailer",
            "--retrier",
            "--pocketbase-url",
            "http://localhost:8090",
            "--pocketbase-email",
            "admin@example.com",
            "--pocketbase-pass",
            "secret",
            "--smtp-hostname",
            "smtp.example.com",
            "--smtp-username",
            "user",
            "--smtp-password",
            "pass",
            "--minio-root-user",
            "minio",
            "--minio-root-password",
            "minio123",
        ]);
        assert_eq!(config.mode(), crate::mode::Mode::Retry);
    }
}
