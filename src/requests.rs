use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client, ClientBuilder,
    header::{self, HeaderMap, HeaderValue},
    multipart, redirect,
};

use crate::{error::SessionResult, ratelimit::RateLimiter};

pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";

const BROWSER_HEADERS: [(&str, &str); 8] = [
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    (
        "accept-language",
        "ru,ru-RU;q=0.9,en-US;q=0.8,en;q=0.7,zh;q=0.6",
    ),
    ("cache-control", "max-age=0"),
    ("connection", "keep-alive"),
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "sec-ch-ua",
        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

/// One request to the consulate site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRequest {
    pub method: Method,
    pub url: String,
    pub session_id: Option<String>,
    /// Sent as multipart/form-data when `method` is `Post`.
    pub form: Vec<(&'static str, String)>,
}

impl SiteRequest {
    pub fn get(url: impl Into<String>) -> Self {
        SiteRequest {
            method: Method::Get,
            url: url.into(),
            session_id: None,
            form: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(&'static str, String)>) -> Self {
        SiteRequest {
            method: Method::Post,
            url: url.into(),
            session_id: None,
            form,
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn form_value(&self, field: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteResponse {
    pub status: u16,
    /// Header names are lower-case.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SiteResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 302 Found, which is how the site moves a visitor to the next step.
    pub fn is_redirect(&self) -> bool {
        self.status == 302
    }

    pub fn location(&self) -> Option<&str> {
        self.header_values("location").next()
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.header_values("set-cookie").map(str::to_string).collect()
    }

    fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Everything the workflow needs from an HTTP stack.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: SiteRequest) -> SessionResult<SiteResponse>;
}

pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl RequestClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in BROWSER_HEADERS {
            default_headers.insert(name, HeaderValue::from_static(value));
        }

        let client = ClientBuilder::new()
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::none())
            .default_headers(default_headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        let rate_limiter = RateLimiter::default();
        Ok(Self {
            client,
            rate_limiter,
        })
    }
}

#[async_trait]
impl Transport for RequestClient {
    async fn execute(&self, request: SiteRequest) -> SessionResult<SiteResponse> {
        // Wait (non-blocking) until we're allowed to make a request according
        // to our self-imposed rate-limiting policy.
        self.rate_limiter.wait_until_ready().await;

        debug!("{:?} {}", request.method, request.url);
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => {
                let form = request
                    .form
                    .into_iter()
                    .fold(multipart::Form::new(), |form, (name, value)| {
                        form.text(name, value)
                    });
                self.client.post(&request.url).multipart(form)
            }
        };
        if let Some(session_id) = &request.session_id {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={session_id}"));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        debug!("{} answered {status} with {} bytes", request.url, body.len());

        Ok(SiteResponse {
            status,
            headers,
            body,
        })
    }
}
