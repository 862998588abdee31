use std::{io::Cursor, sync::Arc, sync::LazyLock};

use image::{DynamicImage, ImageFormat};
use log::info;
use scraper::{Html, Selector};

use crate::{
    error::{SessionError, SessionResult},
    model::CaptchaImage,
    requests::{SESSION_COOKIE, SiteRequest, Transport},
};

static CAPTCHA_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.inp img").unwrap());

/// Rectangle of the served captcha strip that actually carries the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptchaCrop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptchaCrop {
    // The strip holds three 200x200 panels, the code is in the middle one.
    fn default() -> Self {
        CaptchaCrop {
            x: 200,
            y: 0,
            width: 200,
            height: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedCaptcha {
    pub session_id: String,
    pub image: CaptchaImage,
}

pub struct CaptchaLocator {
    transport: Arc<dyn Transport>,
    crop: Option<CaptchaCrop>,
}

impl CaptchaLocator {
    pub fn new(transport: Arc<dyn Transport>, crop: Option<CaptchaCrop>) -> Self {
        Self { transport, crop }
    }

    /// Fetches the captcha referenced by `page_html`. The image response is
    /// what mints the session cookie, so its id is returned alongside.
    pub async fn locate(&self, base_url: &str, page_html: &str) -> SessionResult<LocatedCaptcha> {
        let captcha_url = {
            let document = Html::parse_document(page_html);
            captcha_url(base_url, &document)?
        };
        info!("Captcha url: {captcha_url}");

        let response = self.transport.execute(SiteRequest::get(&captcha_url)).await?;
        let cookies = response.set_cookies();
        let session_id =
            session_id_from_cookies(&cookies).ok_or(SessionError::SessionCookieMissing(cookies))?;
        info!("Session id: {session_id}");

        let image = match self.crop {
            Some(crop) => CaptchaImage::jpeg(crop_to_jpeg(&response.body, crop)?),
            None => CaptchaImage::jpeg(response.body),
        };
        Ok(LocatedCaptcha { session_id, image })
    }
}

pub fn captcha_url(base_url: &str, document: &Html) -> SessionResult<String> {
    let src = document
        .select(&CAPTCHA_IMAGE)
        .next()
        .and_then(|image| image.value().attr("src"))
        .ok_or(SessionError::CaptchaNotFound)?;
    Ok(format!("{base_url}/queue/{src}"))
}

/// Value of the session cookie among raw `Set-Cookie` header values.
pub fn session_id_from_cookies(cookies: &[String]) -> Option<String> {
    cookies
        .iter()
        .flat_map(|cookie| cookie.split(';'))
        .map(str::trim)
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn crop_to_jpeg(bytes: &[u8], crop: CaptchaCrop) -> SessionResult<Vec<u8>> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| SessionError::CaptchaImage(err.to_string()))?;
    let cropped = image.crop_imm(crop.x, crop.y, crop.width, crop.height);

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(cropped.to_rgb8())
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
        .map_err(|err| SessionError::CaptchaImage(err.to_string()))?;
    Ok(encoded)
}
