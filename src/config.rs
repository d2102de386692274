//! Command-line and environment configuration.
//!
//! Every setting can come from a flag or from the environment (a `.env` file
//! is loaded first by the binary).

use crate::domain::appointment::UserId;
use crate::infrastructure::mpesa::{MpesaConfig, MpesaEnvironment};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the payment HTTP API.
    Serve(ServeArgs),
    /// Write the payment ledger to stdout as CSV.
    ExportLedger(ExportLedgerArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Appointments CSV to seed the store with
    /// (`id,user_id,customer_phone,service_name,service_price,date`).
    #[arg(long)]
    pub appointments: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// User ids allowed to review manual payments.
    #[arg(long, env = "ADMIN_USER_IDS", value_delimiter = ',')]
    pub admin_user_ids: Vec<u64>,

    /// Fail pushes with no outcome after this many minutes. Off when unset.
    #[arg(long, env = "STALE_AFTER_MINUTES")]
    pub stale_after_minutes: Option<u64>,

    #[command(flatten)]
    pub mpesa: MpesaArgs,

    #[command(flatten)]
    pub server: ServerConfig,
}

impl ServeArgs {
    pub fn admins(&self) -> impl Iterator<Item = UserId> + '_ {
        self.admin_user_ids.iter().copied().map(UserId)
    }
}

#[derive(Args, Debug)]
pub struct ExportLedgerArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct MpesaArgs {
    #[arg(long, env = "MPESA_CONSUMER_KEY", hide_env_values = true)]
    pub consumer_key: String,
    #[arg(long, env = "MPESA_CONSUMER_SECRET", hide_env_values = true)]
    pub consumer_secret: String,
    #[arg(long, env = "MPESA_SHORTCODE")]
    pub shortcode: String,
    #[arg(long, env = "MPESA_PASSKEY", hide_env_values = true)]
    pub passkey: String,
    /// Public URL of `/api/v1/payments/callback`.
    #[arg(long, env = "MPESA_CALLBACK_URL")]
    pub callback_url: String,
    #[arg(long, env = "MPESA_ENVIRONMENT", value_enum, default_value_t = MpesaEnvironment::Sandbox)]
    pub environment: MpesaEnvironment,
    /// Overrides the environment's base URL.
    #[arg(long, env = "MPESA_BASE_URL")]
    pub base_url: Option<String>,
    #[arg(long, env = "MPESA_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for MpesaArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaArgs")
            .field("shortcode", &self.shortcode)
            .field("callback_url", &self.callback_url)
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl From<MpesaArgs> for MpesaConfig {
    fn from(args: MpesaArgs) -> Self {
        let base_url = args
            .base_url
            .unwrap_or_else(|| args.environment.base_url().to_string());
        MpesaConfig {
            consumer_key: args.consumer_key,
            consumer_secret: args.consumer_secret,
            shortcode: args.shortcode,
            passkey: args.passkey,
            callback_url: args.callback_url,
            base_url,
            timeout: Duration::from_secs(args.timeout_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    #[arg(long, env = "SERVER_PORT", default_value_t = 8000)]
    pub port: u16,
    /// Maximum request body size in megabytes.
    #[arg(long = "body-limit", env = "SERVER_BODY_LIMIT", default_value_t = 1)]
    pub body_limit_mb: u64,
    /// Request timeout in seconds.
    #[arg(id = "server_timeout_secs", long = "timeout", env = "SERVER_TIMEOUT", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            body_limit_mb: 1,
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 10] = [
        "--consumer-key",
        "key",
        "--consumer-secret",
        "secret",
        "--shortcode",
        "174379",
        "--passkey",
        "pk",
        "--callback-url",
        "https://example.test/cb",
    ];

    fn serve(extra: &[&str]) -> ServeArgs {
        let args = ["mpesa-reconciler", "serve"]
            .into_iter()
            .chain(REQUIRED)
            .chain(extra.iter().copied());
        match Cli::try_parse_from(args).unwrap().command {
            Command::Serve(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_debug_assert() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let args = serve(&[]);
        assert_eq!(args.server.port, 8000);
        assert!(args.stale_after_minutes.is_none());
        assert_eq!(args.mpesa.environment, MpesaEnvironment::Sandbox);

        let config = MpesaConfig::from(args.mpesa);
        assert_eq!(config.base_url, "https://sandbox.safaricom.co.ke");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_serve_overrides() {
        let args = serve(&[
            "--environment",
            "production",
            "--base-url",
            "http://127.0.0.1:9000",
            "--admin-user-ids",
            "1,2",
            "--stale-after-minutes",
            "15",
        ]);
        assert_eq!(args.admins().collect::<Vec<_>>(), vec![UserId(1), UserId(2)]);
        assert_eq!(args.stale_after_minutes, Some(15));
        assert_eq!(MpesaConfig::from(args.mpesa).base_url, "http://127.0.0.1:9000");
    }
}
