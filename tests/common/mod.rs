#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::{Value, json};
use slotwatch::{
    AvailabilityEngine, SessionClient, SessionResult,
    captcha_locator::CaptchaLocator,
    captcha_solver::{CaptchaSolver, OcrEndpoint},
    config::SiteMarkers,
    requests::{Method, SiteRequest, SiteResponse, Transport},
};

pub const BASE_URL: &str = "https://hague.kdmid.ru";

pub const ONE_SLOT: &str = include_str!("../fixtures/calendar_with_one_slot.html");
pub const SEVERAL_SLOTS: &str = include_str!("../fixtures/calendar_with_several_slots.html");
pub const NO_SLOTS: &str = include_str!("../fixtures/calendar_with_no_slots.html");
pub const FIXTURE_VIEW_STATE: &str = "/wEPDwUKLTM5NTg4MjQ0Mw9kFgJmD2QWAgIDD2QWAgIBD2QWBAIBDw8WAh4EVGV4dAUKMTAuMDUuMjAyNGRkAgMPPCsACgEADxYCHgJTRBYBBgAAAAAAAAAAZGRk";

pub const CAPTCHA_PAGE: &str = r#"<html><body><form>
    <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="login-vs" />
    <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="login-ev" />
    <div class="inp"><img src="CodeImage.aspx?id=7a1c" alt="" /></div>
</form></body></html>"#;

pub const MENU_PAGE: &str = r#"<html><body>
    <span id="ctl00_MainContent_lblCodeErr"></span>
    <h2>ПЕРЕЧЕНЬ КОНСУЛЬСКИХ ДЕЙСТВИЙ</h2>
</body></html>"#;

pub const WRONG_CAPTCHA_PAGE: &str = r#"<html><body>
    <span id="ctl00_MainContent_lblCodeErr" style="color:Red;">Символы с картинки введены неправильно</span>
</body></html>"#;

pub const FORM_PAGE: &str = r#"<html><body><form>
    <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="queue-vs" />
    <input type="hidden" name="__PREVIOUSPAGE" id="__PREVIOUSPAGE" value="queue-pp" />
    <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="queue-ev" />
</form></body></html>"#;

pub const ORDER_PAGE: &str = r#"<html><body><div class="info">
    Вы записаны в список ожидания по вопросу: Оформление загранпаспорта<br/>
    Номер заявки - 128841<br/>
    Защитный код - A5F2C9D1<br/>
</div></body></html>"#;

pub const ORDER_STATUS_PAGE: &str = r#"<html><body><form>
    <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="status-vs" />
    <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="status-ev" />
    <span id="ctl00_MainContent_lblCodeErr"></span>
    <p>Заявка 128841 найдена</p>
</form></body></html>"#;

pub fn url(path: &str) -> String {
    format!("{BASE_URL}{path}")
}

pub fn html(body: &str) -> SiteResponse {
    SiteResponse {
        status: 200,
        headers: vec![("content-type".to_string(), "text/html; charset=utf-8".to_string())],
        body: body.as_bytes().to_vec(),
    }
}

pub fn redirect(location: &str) -> SiteResponse {
    SiteResponse {
        status: 302,
        headers: vec![("location".to_string(), location.to_string())],
        body: Vec::new(),
    }
}

pub fn captcha(session_id: &str) -> SiteResponse {
    SiteResponse {
        status: 200,
        headers: vec![(
            "set-cookie".to_string(),
            format!("ASP.NET_SessionId={session_id}; path=/; HttpOnly"),
        )],
        body: b"captcha".to_vec(),
    }
}

/// An in-memory site. Each (method, url) answers from its own script; the
/// last scripted response repeats once the rest are used up.
#[derive(Default)]
pub struct ScriptedSite {
    routes: Mutex<HashMap<(Method, String), VecDeque<SiteResponse>>>,
    requests: Mutex<Vec<SiteRequest>>,
}

impl ScriptedSite {
    pub fn on(&self, method: Method, url: impl Into<String>, response: SiteResponse) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.into()))
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<SiteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts_to(&self, url: &str) -> Vec<SiteRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == Method::Post && request.url == url)
            .collect()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedSite {
    async fn execute(&self, request: SiteRequest) -> SessionResult<SiteResponse> {
        let key = (request.method, request.url.clone());
        self.requests.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        let response = match routes.get_mut(&key) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or(SiteResponse {
            status: 404,
            ..SiteResponse::default()
        }))
    }
}

/// OCR that reads the queued texts in order, repeating the last one.
pub struct CannedOcr {
    texts: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl CannedOcr {
    pub fn reading(texts: &[&str]) -> Self {
        CannedOcr {
            texts: Mutex::new(texts.iter().map(|text| text.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEndpoint for CannedOcr {
    async fn recognize(&self, _data_uri: &str) -> SessionResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut texts = self.texts.lock().unwrap();
        let text = if texts.len() > 1 {
            texts.pop_front().unwrap_or_default()
        } else {
            texts.front().cloned().unwrap_or_default()
        };
        Ok(json!({ "data": ["data:image/jpeg;base64,", { "data": [[text, 0.98]] }] }))
    }
}

pub fn session_client(site: Arc<ScriptedSite>, ocr: Arc<CannedOcr>) -> SessionClient {
    SessionClient::new(
        site.clone(),
        CaptchaLocator::new(site, None),
        CaptchaSolver::new(ocr),
        SiteMarkers::default(),
    )
}

pub fn engine(
    site: Arc<ScriptedSite>,
    ocr: Arc<CannedOcr>,
    max_attempts: u32,
    diagnostics_dir: PathBuf,
) -> AvailabilityEngine {
    AvailabilityEngine::new(session_client(site, ocr), max_attempts, diagnostics_dir)
}

/// Login page, captcha and an accepted login form, minting `session_id`.
pub fn script_login(site: &ScriptedSite, session_id: &str) {
    site.on(Method::Get, url("/queue/visitor.aspx"), html(CAPTCHA_PAGE))
        .on(Method::Get, url("/queue/CodeImage.aspx?id=7a1c"), captcha(session_id))
        .on(Method::Post, url("/queue/visitor.aspx"), html(MENU_PAGE));
}

/// A fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slotwatch-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
