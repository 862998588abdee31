use thiserror::Error;

use crate::model::CaptchaImage;

/// Everything that can go wrong while walking the consulate queue pages.
///
/// Only the captcha-class variants are worth retrying; the rest either mean
/// the site rejected us or that its markup changed shape.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("captcha '{code}' was rejected by the site")]
    WrongCaptcha { code: String, image: CaptchaImage },
    #[error("failed to read a captcha code: {reason}")]
    CaptchaParse { reason: String, image: CaptchaImage },
    #[error("the site rejected the submitted data: {0}")]
    DataValidation(String),
    #[error("menu marker is missing on the page after login")]
    MenuNotFound,
    #[error("too many requests for this identity")]
    TooManyRequests,
    #[error("unexpected response (status {status}) while {step}")]
    UnexpectedResponse { status: u16, step: &'static str },
    #[error("session expired: {0}")]
    SessionExpired(String),
    #[error("the order is blocked")]
    AccountBlocked,
    #[error("unexpected page: {0}")]
    UnexpectedPage(String),
    #[error("captcha image is not on the page")]
    CaptchaNotFound,
    #[error("session cookie is missing in set-cookie headers {0:?}")]
    SessionCookieMissing(Vec<String>),
    #[error("calendar widget is not on the page")]
    CalendarWidgetNotFound,
    #[error("failed to parse calendar header '{0}'")]
    CalendarHeaderFormat(String),
    #[error("unknown month '{0}'")]
    UnknownMonth(String),
    #[error("unexpected postback directive '{0}'")]
    UnexpectedPostbackFormat(String),
    #[error("calendar has {0} selected days, expected exactly one")]
    SelectedDayCount(usize),
    #[error("slot panel is not on the page")]
    SlotPanelNotFound,
    #[error("failed to parse slot label '{0}'")]
    SlotFormat(String),
    #[error("order info is not on the page")]
    OrderNotFound,
    #[error("failed to parse order number or code from {0:?}")]
    OrderFormat(Vec<String>),
    #[error("the order is not confirmed yet")]
    OrderNotConfirmed,
    #[error("expected to land on '{expected}', got '{actual}'")]
    UnexpectedCalendarPath { expected: String, actual: String },
    #[error("failed to process captcha image: {0}")]
    CaptchaImage(String),
    #[error("malformed OCR response: {0}")]
    OcrResponse(String),
    #[error("form '{form}' needs a value for '{field}'")]
    FormValueMissing {
        form: &'static str,
        field: &'static str,
    },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl SessionError {
    /// True for failures a fresh captcha might fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::WrongCaptcha { .. } | SessionError::CaptchaParse { .. }
        )
    }

    pub fn captcha_image(&self) -> Option<&CaptchaImage> {
        match self {
            SessionError::WrongCaptcha { image, .. } | SessionError::CaptchaParse { image, .. } => {
                Some(image)
            }
            _ => None,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
