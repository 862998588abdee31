use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    error::{SessionError, SessionResult},
    model::CaptchaImage,
};

pub const DEFAULT_OCR_ENDPOINT: &str = "https://tomofi-easyocr.hf.space/api/predict/";
pub const CAPTCHA_CODE_LENGTH: usize = 6;

/// An OCR service that reads text off a base64 data-URI image.
///
/// The answer is the service's raw JSON: `{"data": [<image>, {"data": [[text, confidence], ...]}]}`.
#[async_trait]
pub trait OcrEndpoint: Send + Sync {
    async fn recognize(&self, data_uri: &str) -> SessionResult<Value>;
}

/// EasyOCR behind a Gradio `predict` API.
pub struct HttpOcrEndpoint {
    client: Client,
    url: String,
}

impl HttpOcrEndpoint {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl OcrEndpoint for HttpOcrEndpoint {
    async fn recognize(&self, data_uri: &str) -> SessionResult<Value> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "data": [data_uri, ["en"]] }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

pub struct CaptchaSolver {
    endpoint: Arc<dyn OcrEndpoint>,
}

impl CaptchaSolver {
    pub fn new(endpoint: Arc<dyn OcrEndpoint>) -> Self {
        Self { endpoint }
    }

    pub async fn solve(&self, image: &CaptchaImage) -> SessionResult<String> {
        info!("Start solving captcha");
        let response = self.endpoint.recognize(&data_uri(image)).await?;
        let code = select_code(&response, image)?;
        info!("Captcha code: {code}");
        Ok(code)
    }
}

pub fn data_uri(image: &CaptchaImage) -> String {
    format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.bytes))
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Recognition {
    data: Vec<(String, f64)>,
}

/// Picks the longest candidate (ties go to the higher confidence, then to the
/// earlier one) and keeps its digits, which must be exactly
/// `CAPTCHA_CODE_LENGTH` long.
pub fn select_code(response: &Value, image: &CaptchaImage) -> SessionResult<String> {
    let unreadable = |reason: String| SessionError::CaptchaParse {
        reason,
        image: image.clone(),
    };

    let predict = PredictResponse::deserialize(response)
        .map_err(|err| SessionError::OcrResponse(err.to_string()))?;
    let Some(recognition) = predict.data.get(1) else {
        return Err(unreadable("no array with data".to_string()));
    };
    let candidates = Recognition::deserialize(recognition)
        .map_err(|err| SessionError::OcrResponse(err.to_string()))?
        .data;
    debug!("OCR candidates: {candidates:?}");

    // Ordered best first, so `min_by` keeps the earliest of equal candidates.
    let Some((best, _)) = candidates.into_iter().min_by(|(text_a, prob_a), (text_b, prob_b)| {
        text_b
            .chars()
            .count()
            .cmp(&text_a.chars().count())
            .then(prob_b.total_cmp(prob_a))
    }) else {
        return Err(unreadable("no candidates".to_string()));
    };

    let code: String = best.chars().filter(char::is_ascii_digit).collect();
    if code.len() != CAPTCHA_CODE_LENGTH {
        return Err(unreadable(format!(
            "expected {CAPTCHA_CODE_LENGTH} digits, got '{code}' from '{best}'"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> CaptchaImage {
        CaptchaImage::jpeg(vec![0xff, 0xd8, 0xff])
    }

    fn predict(candidates: Value) -> Value {
        json!({
            "data": ["data:image/jpeg;base64,AAAA", {"headers": [1, 2], "data": candidates}],
            "durations": [2.23872971534729],
            "avg_durations": [20.300637995726184],
            "flag_index": null,
            "updated_state": null
        })
    }

    fn reason(error: SessionError) -> String {
        match error {
            SessionError::CaptchaParse { reason, .. } => reason,
            other => panic!("expected a captcha parse error, got {other:?}"),
        }
    }

    struct CannedOcr(Value);

    #[async_trait]
    impl OcrEndpoint for CannedOcr {
        async fn recognize(&self, data_uri: &str) -> SessionResult<Value> {
            assert!(data_uri.starts_with("data:image/jpeg;base64,"));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn reads_single_candidate() {
        let response = predict(json!([["022880", 0.8627397480794481]]));
        assert_eq!(select_code(&response, &image()).unwrap(), "022880");
    }

    #[test]
    fn prefers_longer_candidates_over_confident_ones() {
        let response = predict(json!([["2880", 0.99], ["022880", 0.41], ["0228", 0.97]]));
        assert_eq!(select_code(&response, &image()).unwrap(), "022880");
    }

    #[test]
    fn breaks_length_ties_by_confidence() {
        let response = predict(json!([["123456", 0.40], ["654321", 0.90], ["111111", 0.65]]));
        assert_eq!(select_code(&response, &image()).unwrap(), "654321");
    }

    #[test]
    fn exact_ties_keep_the_first_candidate() {
        let response = predict(json!([["123456", 0.9], ["654321", 0.9]]));
        assert_eq!(select_code(&response, &image()).unwrap(), "123456");
    }

    #[test]
    fn strips_non_digits_after_selection() {
        let response = predict(json!([["02 28-80", 0.7], ["022880", 0.9]]));
        assert_eq!(select_code(&response, &image()).unwrap(), "022880");
    }

    #[test]
    fn never_pads_or_truncates() {
        let short = predict(json!([["02288", 0.9]]));
        assert!(reason(select_code(&short, &image()).unwrap_err()).contains("'02288'"));

        let long = predict(json!([["0228801", 0.9]]));
        assert!(reason(select_code(&long, &image()).unwrap_err()).contains("'0228801'"));

        // The selected guess is not revisited when its digits fall short.
        let letters = predict(json!([["O2288O", 0.9], ["022880", 0.8]]));
        assert!(select_code(&letters, &image()).is_err());
    }

    #[test]
    fn reports_missing_results() {
        let no_array = json!({"data": ["data:image/jpeg;base64,AAAA"]});
        assert_eq!(
            reason(select_code(&no_array, &image()).unwrap_err()),
            "no array with data"
        );

        let empty = predict(json!([]));
        assert_eq!(reason(select_code(&empty, &image()).unwrap_err()), "no candidates");

        let error = select_code(&json!({"error": "queue full"}), &image()).unwrap_err();
        assert!(matches!(error, SessionError::OcrResponse(_)));
    }

    #[test]
    fn captcha_parse_error_keeps_image() {
        let error = select_code(&predict(json!([["1", 0.5]])), &image()).unwrap_err();
        assert_eq!(error.captcha_image(), Some(&image()));
    }

    #[test]
    fn encodes_data_uri() {
        assert_eq!(data_uri(&image()), "data:image/jpeg;base64,/9j/");
    }

    #[tokio::test]
    async fn solves_through_endpoint() {
        let solver = CaptchaSolver::new(Arc::new(CannedOcr(predict(json!([["022880", 0.86]])))));
        assert_eq!(solver.solve(&image()).await.unwrap(), "022880");
    }
}
