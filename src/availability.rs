use std::{future::Future, path::PathBuf};

use chrono::Utc;
use log::{info, warn};

use crate::{
    error::{SessionError, SessionResult},
    model::{CaptchaImage, SessionInfo, UserInfo, Website, WorkflowVariant},
    session_client::{CALENDAR_PATH, SessionClient},
    slot_parser::Slot,
};

/// Last known-good session of one site.
///
/// A check takes the session out and only puts it back when the check went
/// through, so a session that failed is never reused.
#[derive(Debug, Default)]
pub struct SessionCache {
    slot: Option<SessionInfo>,
}

impl SessionCache {
    pub fn take(&mut self) -> Option<SessionInfo> {
        self.slot.take()
    }

    pub fn put_back(&mut self, session: SessionInfo) {
        self.slot = Some(session);
    }

    pub fn peek(&self) -> Option<&SessionInfo> {
        self.slot.as_ref()
    }
}

pub struct AvailabilityEngine {
    client: SessionClient,
    max_attempts: u32,
    diagnostics_dir: PathBuf,
}

impl AvailabilityEngine {
    pub fn new(client: SessionClient, max_attempts: u32, diagnostics_dir: PathBuf) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            diagnostics_dir,
        }
    }

    /// Runs one check of `website`. Must not be called concurrently for the
    /// same site; the caller's lane owns `cache`.
    pub async fn check_availability(
        &self,
        website: &Website,
        cache: &mut SessionCache,
    ) -> SessionResult<Vec<Slot>> {
        info!("Started finding available slots for {}", website.base_url);
        match website.variant {
            WorkflowVariant::Direct => self.direct_check(website, cache).await,
            WorkflowVariant::EmailConfirmation => self.email_confirmation_check(website).await,
        }
    }

    async fn direct_check(
        &self,
        website: &Website,
        cache: &mut SessionCache,
    ) -> SessionResult<Vec<Slot>> {
        if let Some(session) = cache.take() {
            info!("Found cached session {}", session.session_id);
            match self.client.check_slots(&session, CALENDAR_PATH).await {
                Ok(slots) => {
                    cache.put_back(session);
                    return Ok(slots);
                }
                Err(SessionError::SessionExpired(reason)) => {
                    info!("Cached session expired ({reason}), starting a new one");
                }
                Err(err) => return Err(err),
            }
        }

        let session = self.login(website).await?;
        let calendar_path = self
            .client
            .pass_to_order_page(&session, website.order_route)
            .await?;
        if calendar_path != CALENDAR_PATH {
            return Err(SessionError::UnexpectedCalendarPath {
                expected: CALENDAR_PATH.to_string(),
                actual: calendar_path,
            });
        }

        let slots = self.client.check_slots(&session, CALENDAR_PATH).await?;
        cache.put_back(session);
        Ok(slots)
    }

    async fn email_confirmation_check(&self, website: &Website) -> SessionResult<Vec<Slot>> {
        let session = self.login(website).await?;
        let order_path = self
            .client
            .pass_to_order_page(&session, website.order_route)
            .await?;
        let order = self.client.parse_order(&session, &order_path).await?;

        let order = &order;
        let user = &session.user;
        let (order_session, calendar_path) = self
            .with_captcha_retries("order status", move || {
                self.client
                    .start_checking_order(website.base_url, user.clone(), order)
            })
            .await?;
        info!("Order session {}", order_session.session_id);

        self.client.check_slots(&order_session, &calendar_path).await
    }

    async fn login(&self, website: &Website) -> SessionResult<SessionInfo> {
        info!("Starting a new session");
        let session = self
            .with_captcha_retries("login", move || {
                self.client
                    .start_session(website.base_url, UserInfo::generate())
            })
            .await?;
        info!("Got session {}", session.session_id);
        Ok(session)
    }

    /// Retries `attempt` on captcha failures only, saving every rejected
    /// captcha to the diagnostics dir. Anything else is returned at once.
    async fn with_captcha_retries<T, F, Fut>(&self, step: &str, mut attempt: F) -> SessionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SessionResult<T>>,
    {
        let mut attempt_number = 1;
        loop {
            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            let saved = match err.captcha_image() {
                Some(image) => self.save_captcha(image, attempt_number).await,
                None => None,
            };
            warn!(
                "{step} attempt {attempt_number}/{} failed: {err}. Captcha file {}",
                self.max_attempts,
                saved.map_or_else(|| "not saved".to_string(), |path| path.display().to_string())
            );

            if attempt_number >= self.max_attempts {
                return Err(err);
            }
            attempt_number += 1;
        }
    }

    async fn save_captcha(&self, image: &CaptchaImage, attempt_number: u32) -> Option<PathBuf> {
        let path = self.diagnostics_dir.join(format!(
            "captcha-{}-{attempt_number}.{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            image.file_extension()
        ));
        match tokio::fs::write(&path, &image.bytes).await {
            Ok(()) => Some(path),
            Err(err) => {
                warn!("Failed to save captcha to {}: {err}", path.display());
                None
            }
        }
    }
}
