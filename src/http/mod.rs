use crate::config::Config;
use crate::error::CallError;
use crate::retry::{CallOutcome, RateLimitStatus};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// A decoded successful response plus the paging metadata that came with it.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub value: T,
    pub last_page: Option<u32>,
}

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        default_headers.insert(USER_AGENT, ua);
    }
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
}

pub fn map_status_to_error(status: StatusCode, message: String) -> CallError {
    let code = match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        StatusCode::UNPROCESSABLE_ENTITY => "unprocessable",
        s if s.is_server_error() => "upstream_error",
        _ => "server_error",
    };
    CallError::new(code, message)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Rate budget from `x-ratelimit-remaining` / `x-ratelimit-reset`, when both are present.
pub fn extract_rate_from_rest(headers: &HeaderMap) -> Option<RateLimitStatus> {
    let remaining = header_str(headers, "x-ratelimit-remaining")?
        .parse::<u32>()
        .ok()?;
    let reset_at = header_str(headers, "x-ratelimit-reset")?
        .parse::<i64>()
        .ok()
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))?;
    Some(RateLimitStatus {
        remaining,
        reset_at,
    })
}

/// GitHub signals throttling with 429, or 403 once the primary budget hits zero.
pub fn is_rate_limited(status: StatusCode, rate: Option<&RateLimitStatus>) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && rate.is_some_and(|r| r.remaining == 0))
}

/// Throttle signal for a rate-limited response.
///
/// `Retry-After` (sent with secondary limits) overrides the primary budget
/// headers, which may still report plenty of calls left.
pub fn throttle_status(headers: &HeaderMap, rate: Option<RateLimitStatus>) -> RateLimitStatus {
    let retry_after = header_str(headers, RETRY_AFTER.as_str()).and_then(|s| s.parse::<i64>().ok());
    match (retry_after, rate) {
        (Some(secs), _) => RateLimitStatus {
            remaining: 0,
            reset_at: Utc::now() + chrono::Duration::seconds(secs),
        },
        (None, Some(rate)) => rate,
        (None, None) => RateLimitStatus {
            remaining: 0,
            reset_at: Utc::now(),
        },
    }
}

/// Page number of the `rel="last"` entry of a `Link` header.
pub fn last_page_from_link(headers: &HeaderMap) -> Option<u32> {
    let link = header_str(headers, LINK.as_str())?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        if !parts.any(|p| p.trim() == "rel=\"last\"") {
            return None;
        }
        let url = url::Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse::<u32>().ok())
    })
}

pub fn encode_path_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// One REST call against the GitHub API, classified for the retry layer.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    cfg: Config,
}

impl RestClient {
    pub fn new(cfg: Config) -> reqwest::Result<Self> {
        let client = build_client(&cfg)?;
        Ok(Self { client, cfg })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> CallOutcome<Response<T>> {
        self.send::<T, ()>(Method::GET, path, query, None).await
    }

    pub async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> CallOutcome<Response<T>> {
        let url = format!("{}{}", self.cfg.api_url, path);
        let auth = match HeaderValue::from_str(&format!("Bearer {}", self.cfg.token)) {
            Ok(v) => v,
            Err(e) => return CallOutcome::Fatal(CallError::new("unauthorized", e.to_string())),
        };
        let mut req = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, auth)
            .header("X-GitHub-Api-Version", &self.cfg.api_version)
            .header(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("REST {} {} error sending request: {}", method, url, e);
                return CallOutcome::Fatal(CallError::new("transport", e.to_string()));
            }
        };

        let status = res.status();
        let headers = res.headers().clone();
        let rate = extract_rate_from_rest(&headers);
        match &rate {
            Some(r) => debug!(
                "REST {} {} -> {} (rate remaining {}, resets {})",
                method,
                url,
                status,
                r.remaining,
                r.reset_at.to_rfc3339()
            ),
            None => debug!("REST {} {} -> {}", method, url, status),
        }

        if status.is_success() {
            let bytes = match res.bytes().await {
                Ok(b) => b,
                Err(e) => return CallOutcome::Fatal(CallError::new("transport", e.to_string())),
            };
            // 204 and friends carry no body; decode them as JSON null.
            let raw: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
            return match serde_json::from_slice::<T>(raw) {
                Ok(value) => CallOutcome::Success(Response {
                    value,
                    last_page: last_page_from_link(&headers),
                }),
                Err(e) => CallOutcome::Fatal(CallError::new("decode", e.to_string())),
            };
        }

        if is_rate_limited(status, rate.as_ref()) {
            return CallOutcome::RateLimited(throttle_status(&headers, rate));
        }
        let text = res.text().await.unwrap_or_default();
        CallOutcome::Fatal(map_status_to_error(status, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_matrix() {
        assert_eq!(
            map_status_to_error(StatusCode::BAD_REQUEST, "".into()).code,
            "bad_request"
        );
        assert_eq!(
            map_status_to_error(StatusCode::UNAUTHORIZED, "".into()).code,
            "unauthorized"
        );
        assert_eq!(
            map_status_to_error(StatusCode::NOT_FOUND, "".into()).code,
            "not_found"
        );
        assert_eq!(
            map_status_to_error(StatusCode::UNPROCESSABLE_ENTITY, "".into()).code,
            "unprocessable"
        );
        assert_eq!(
            map_status_to_error(StatusCode::BAD_GATEWAY, "".into()).code,
            "upstream_error"
        );
    }

    #[test]
    fn forbidden_is_throttling_only_with_empty_budget() {
        let spent = RateLimitStatus {
            remaining: 0,
            reset_at: Utc::now(),
        };
        let left = RateLimitStatus {
            remaining: 12,
            ..spent
        };
        assert!(is_rate_limited(StatusCode::FORBIDDEN, Some(&spent)));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, Some(&left)));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, None));
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, None));
    }

    #[test]
    fn throttle_without_headers_uses_retry_after() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, "30".parse().unwrap());
        let status = throttle_status(&h, None);
        assert_eq!(status.remaining, 0);
        assert!(status.reset_at > Utc::now() + chrono::Duration::seconds(25));
    }

    #[test]
    fn retry_after_overrides_primary_budget() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, "60".parse().unwrap());
        let budget = RateLimitStatus {
            remaining: 4000,
            reset_at: Utc::now() + chrono::Duration::hours(1),
        };
        let status = throttle_status(&h, Some(budget));
        assert_eq!(status.remaining, 0);
        assert!(status.reset_at < Utc::now() + chrono::Duration::seconds(61));
        // Without Retry-After the primary budget stands.
        assert_eq!(throttle_status(&HeaderMap::new(), Some(budget)), budget);
    }
}
