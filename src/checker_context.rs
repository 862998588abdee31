use std::{sync::Arc, time::Duration};

use anyhow::Context;
use reqwest::Client;

use crate::{
    availability::AvailabilityEngine,
    captcha_locator::{CaptchaCrop, CaptchaLocator},
    captcha_solver::{CaptchaSolver, HttpOcrEndpoint},
    config::{CheckerConfig, SiteMarkers},
    requests::{RequestClient, Transport},
    scheduler::CheckIntervals,
    session_client::SessionClient,
};

// The hosted OCR model can take a while to wake up.
const OCR_TIMEOUT: Duration = Duration::from_secs(60);

pub struct CheckerContext {
    pub config: CheckerConfig,
    pub markers: SiteMarkers,
    pub transport: Arc<dyn Transport>,
    pub http_client: Client,
}

impl CheckerContext {
    pub fn new() -> anyhow::Result<Self> {
        let config = CheckerConfig::new()?;
        let markers = SiteMarkers::new()?;
        let transport = Arc::new(RequestClient::new(config.request_timeout)?);
        let http_client = Client::builder()
            .timeout(OCR_TIMEOUT)
            .build()
            .context("failed to build the OCR and telegram http client")?;
        Ok(CheckerContext {
            config,
            markers,
            transport,
            http_client,
        })
    }

    pub fn availability_engine(&self) -> AvailabilityEngine {
        let captcha_locator =
            CaptchaLocator::new(self.transport.clone(), Some(CaptchaCrop::default()));
        let captcha_solver = CaptchaSolver::new(Arc::new(HttpOcrEndpoint::new(
            self.http_client.clone(),
            &self.config.ocr_endpoint_url,
        )));
        let client = SessionClient::new(
            self.transport.clone(),
            captcha_locator,
            captcha_solver,
            self.markers.clone(),
        );
        AvailabilityEngine::new(
            client,
            self.config.captcha_attempts,
            self.config.captcha_diagnostics_dir.clone(),
        )
    }

    pub fn check_intervals(&self) -> CheckIntervals {
        CheckIntervals {
            day: self.config.day_check_interval,
            night: self.config.night_check_interval,
        }
    }
}
