use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{captcha_solver::DEFAULT_OCR_ENDPOINT, model::Website};

/// The env vars needed to run the checker.
#[derive(Debug, Deserialize)]
pub struct CheckerEnv {
    #[serde(default = "default_site")]
    site: String,
    telegram_api_key: Option<String>,
    #[serde(default)]
    telegram_chat_ids: String,
    #[serde(default = "default_ocr_endpoint_url")]
    ocr_endpoint_url: String,
    #[serde(default = "default_day_check_interval_secs")]
    day_check_interval_secs: u64,
    #[serde(default = "default_night_check_interval_secs")]
    night_check_interval_secs: u64,
    #[serde(default = "default_captcha_attempts")]
    captcha_attempts: u32,
    captcha_diagnostics_dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_site() -> String {
    Website::HAGUE.name.to_string()
}

fn default_ocr_endpoint_url() -> String {
    DEFAULT_OCR_ENDPOINT.to_string()
}

fn default_day_check_interval_secs() -> u64 {
    600
}

fn default_night_check_interval_secs() -> u64 {
    3600
}

fn default_captcha_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug)]
pub struct CheckerConfig {
    pub website: Website,
    pub telegram_api_key: Option<String>,
    pub telegram_chat_ids: Vec<i64>,
    pub ocr_endpoint_url: String,
    pub day_check_interval: Duration,
    pub night_check_interval: Duration,
    pub captcha_attempts: u32,
    pub captcha_diagnostics_dir: PathBuf,
    pub request_timeout: Duration,
}

impl CheckerConfig {
    pub fn new() -> anyhow::Result<Self> {
        CheckerConfig::from_env(CheckerEnv::load_from_env()?)
    }

    pub fn from_env(env: CheckerEnv) -> anyhow::Result<Self> {
        let website = Website::by_name(&env.site)
            .with_context(|| format!("unknown site '{}'", env.site))?;
        let telegram_chat_ids = parse_chat_ids(&env.telegram_chat_ids)?;
        if env.captcha_attempts == 0 {
            anyhow::bail!("CAPTCHA_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            website,
            telegram_api_key: env.telegram_api_key.filter(|key| !key.trim().is_empty()),
            telegram_chat_ids,
            ocr_endpoint_url: env.ocr_endpoint_url,
            day_check_interval: Duration::from_secs(env.day_check_interval_secs),
            night_check_interval: Duration::from_secs(env.night_check_interval_secs),
            captcha_attempts: env.captcha_attempts,
            captcha_diagnostics_dir: env
                .captcha_diagnostics_dir
                .unwrap_or_else(std::env::temp_dir),
            request_timeout: Duration::from_secs(env.request_timeout_secs),
        })
    }
}

fn parse_chat_ids(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .with_context(|| format!("invalid telegram chat id '{id}'"))
        })
        .collect()
}

/// Text the site shows at the decision points of the workflow. Each one can
/// be overridden with a `MARKER_` env var.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteMarkers {
    pub wrong_captcha: String,
    pub menu: String,
    pub too_many_requests: String,
    pub blocked: String,
    pub no_free_time: String,
    pub waitlist_order: String,
    pub order_unconfirmed: String,
}

impl Default for SiteMarkers {
    fn default() -> Self {
        SiteMarkers {
            wrong_captcha: "Символы с картинки введены неправильно".to_string(),
            menu: "ПЕРЕЧЕНЬ КОНСУЛЬСКИХ ДЕЙСТВИЙ".to_string(),
            too_many_requests: "Превышено ограничение на количество вопросов".to_string(),
            blocked: "Ваша заявка заблокирована".to_string(),
            no_free_time: "нет свободного времени".to_string(),
            waitlist_order: "Вы записаны в список ожидания по вопросу".to_string(),
            order_unconfirmed: "Ваша заявка требует подтверждения".to_string(),
        }
    }
}

impl SiteMarkers {
    pub fn new() -> anyhow::Result<Self> {
        SiteMarkers::load_from_prefixed_env("MARKER_")
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }

    fn load_from_prefixed_env(prefix: &str) -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();
        let config = envy::prefixed(prefix)
            .from_env::<Self>()
            .with_context(|| format!("failed to load {prefix}* env variables into config struct"))?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
