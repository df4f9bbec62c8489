use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use tracing::info;

pub const RANDOM_ORG_URL: &str = "https://api.random.org/json-rpc/4/invoke";
pub const STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub lottery_name: String,
    pub lucky_dip_prize_pence: i64,
    pub random_org_url: String,
    pub random_org_api_key: String,
    pub stripe_api_url: String,
    pub stripe_secret_key: String,
    pub notify_winners_url: String,
    pub renewal_reminder_url: String,
}

pub fn load() -> Result<Config> {
    Ok(Config {
        database_url: optional("LOTTERY_DB_PATH", "data/lottery.db"),
        lottery_name: optional("LOTTERY_NAME", "club-lotto"),
        lucky_dip_prize_pence: parsed("LUCKY_DIP_PRIZE_PENCE", "1000")?,
        random_org_url: optional("RANDOM_ORG_URL", RANDOM_ORG_URL),
        random_org_api_key: required("RANDOM_ORG_API_KEY")?,
        stripe_api_url: optional("STRIPE_API_URL", STRIPE_API_URL),
        stripe_secret_key: required("STRIPE_SECRET_KEY")?,
        notify_winners_url: required("NOTIFY_WINNERS_URL")?,
        renewal_reminder_url: required("RENEWAL_REMINDER_URL")?,
    })
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("Environment variable {key} is required"))
}

fn parsed<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional(key, default)
        .trim()
        .parse()
        .with_context(|| format!("Invalid {key} value"))
}
