//! Blocking MediaWiki Action API session.
//!
//! One [`ApiSession`] owns a cookie-carrying `ureq` agent and the CSRF token
//! obtained at login. All requests ask for `format=json&formatversion=2`.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use wikisync_core::{Credentials, PageRevision, RemoteError, MISSING_TITLE};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay before the first retry; doubles on each further retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

const PRODUCT: &str = concat!("wikisync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    query: TokensQuery,
}

#[derive(Debug, Deserialize)]
struct TokensQuery {
    tokens: Tokens,
}

#[derive(Debug, Deserialize)]
struct Tokens {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    result: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RevisionsResponse {
    query: RevisionsQuery,
}

#[derive(Debug, Deserialize)]
struct RevisionsQuery {
    #[serde(default)]
    pages: Vec<QueryPage>,
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    invalidreason: Option<String>,
    #[serde(default)]
    revisions: Vec<QueryRevision>,
}

#[derive(Debug, Deserialize)]
struct QueryRevision {
    revid: u64,
    timestamp: String,
    slots: Slots,
}

#[derive(Debug, Deserialize)]
struct Slots {
    main: MainSlot,
}

#[derive(Debug, Deserialize)]
struct MainSlot {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    edit: EditResult,
}

/// The `edit` object of an `action=edit` response.
#[derive(Debug, Clone, Deserialize)]
pub struct EditResult {
    pub result: String,
    pub title: Option<String>,
    pub newrevid: Option<u64>,
    #[serde(default)]
    pub nochange: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct ApiSession {
    agent: ureq::Agent,
    api_url: String,
    credentials: Credentials,
    max_retries: u32,
    retry_backoff: Duration,
    csrf_token: RwLock<Option<String>>,
}

impl ApiSession {
    pub fn new(credentials: Credentials, max_retries: u32) -> Self {
        let user_agent = format!(
            "{} ({PRODUCT})",
            credentials.user_agent.as_deref().unwrap_or("wikisync")
        );
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(&user_agent)
            .build();
        Self {
            agent,
            api_url: credentials.api_url.clone(),
            credentials,
            max_retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            csrf_token: RwLock::new(None),
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Bot-password login, then fetch the CSRF token used for writes.
    pub fn login(&self) -> Result<(), RemoteError> {
        let tokens: TokensResponse =
            self.get(&[("action", "query"), ("meta", "tokens"), ("type", "login")])?;
        let login_token = tokens
            .query
            .tokens
            .logintoken
            .ok_or_else(|| RemoteError::Authentication("no login token returned".into()))?;

        let response: LoginResponse = self.post(&[
            ("action", "login"),
            ("lgname", self.credentials.username.as_str()),
            ("lgpassword", self.credentials.password.as_str()),
            ("lgtoken", login_token.as_str()),
        ])?;
        if response.login.result != "Success" {
            let reason = response
                .login
                .reason
                .unwrap_or_else(|| response.login.result.clone());
            return Err(RemoteError::Authentication(reason));
        }

        let tokens: TokensResponse = self.get(&[("action", "query"), ("meta", "tokens")])?;
        let csrf = tokens
            .query
            .tokens
            .csrftoken
            .ok_or_else(|| RemoteError::Authentication("no csrf token returned".into()))?;
        *self
            .csrf_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(csrf);
        tracing::debug!(user = %self.credentials.username, "mediawiki login succeeded");
        Ok(())
    }

    /// Latest revision of `title`; `missingtitle` if the page does not exist.
    pub fn fetch_revision(&self, title: &str) -> Result<PageRevision, RemoteError> {
        let response: RevisionsResponse = self.get(&[
            ("action", "query"),
            ("prop", "revisions"),
            ("titles", title),
            ("rvprop", "ids|timestamp|content"),
            ("rvslots", "main"),
        ])?;
        let page = response
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::api("nopage", format!("no page returned for {title}")))?;

        if page.invalid {
            let info = page.invalidreason.unwrap_or_else(|| "invalid title".into());
            return Err(RemoteError::api("invalidtitle", info));
        }
        if page.missing {
            return Err(RemoteError::api(
                MISSING_TITLE,
                "The page you specified doesn't exist.",
            ));
        }
        let revision = page
            .revisions
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::api(MISSING_TITLE, "The page has no revisions."))?;
        Ok(PageRevision {
            title: page.title,
            content: revision.slots.main.content,
            revision_id: Some(revision.revid),
            timestamp: Some(revision.timestamp),
        })
    }

    /// Submit `text` to `title`.
    pub fn submit_edit(
        &self,
        title: &str,
        text: &str,
        summary: &str,
        base_timestamp: Option<&str>,
        create_only: bool,
    ) -> Result<EditResult, RemoteError> {
        let token = self
            .csrf_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| RemoteError::Authentication("not logged in".into()))?;

        let mut params: Vec<(&str, &str)> = vec![
            ("action", "edit"),
            ("title", title),
            ("text", text),
            ("summary", summary),
            ("bot", "1"),
        ];
        if create_only {
            params.push(("createonly", "1"));
        } else {
            params.push(("nocreate", "1"));
        }
        if let Some(ts) = base_timestamp {
            params.push(("basetimestamp", ts));
        }
        // MediaWiki wants the token last so truncated bodies are rejected.
        params.push(("token", token.as_str()));

        let response: EditResponse = self.post(&params)?;
        if response.edit.result != "Success" {
            return Err(RemoteError::api(
                response.edit.result.to_lowercase(),
                format!("edit of {title} was not accepted"),
            ));
        }
        Ok(response.edit)
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, RemoteError> {
        self.with_retries(|| {
            let mut request = self.agent.get(&self.api_url);
            for (key, value) in with_format(params) {
                request = request.query(key, value);
            }
            request.call()
        })
    }

    fn post<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, RemoteError> {
        self.with_retries(|| {
            let form = with_format(params);
            self.agent.post(&self.api_url).send_form(&form)
        })
    }

    /// Run `send`, retrying transport failures and 5xx answers up to
    /// `max_retries` times with exponential backoff, then decode the API
    /// envelope. Blocks the calling thread while waiting.
    fn with_retries<T, F>(&self, send: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<ureq::Response, ureq::Error>,
    {
        let attempts = self.max_retries.saturating_add(1);
        let mut last = RemoteError::Transport("no request sent".into());
        for attempt in 1..=attempts {
            match send() {
                Ok(response) => return decode(response),
                Err(ureq::Error::Status(status, response)) if status < 500 => {
                    // MediaWiki reports API errors with 200; other 4xx are final.
                    let body = response.into_string().unwrap_or_default();
                    return Err(RemoteError::Transport(format!("HTTP {status}: {body}")));
                }
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "mediawiki request failed");
                    last = RemoteError::Transport(err.to_string());
                    if attempt < attempts {
                        let delay = self.backoff_delay(attempt);
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                }
            }
        }
        Err(last)
    }

    /// Wait before retry number `retry` (1-based): `backoff × 2^(retry-1)`,
    /// with the exponent capped at 8.
    fn backoff_delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(8);
        self.retry_backoff.saturating_mul(1u32 << shift)
    }
}

fn with_format<'a>(params: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut all = vec![("format", "json"), ("formatversion", "2")];
    all.extend_from_slice(params);
    all
}

fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T, RemoteError> {
    let value: Value = response
        .into_json()
        .map_err(|e| RemoteError::Transport(format!("invalid JSON response: {e}")))?;
    if let Some(error) = value.get("error") {
        let body: ApiErrorBody = serde_json::from_value(error.clone())
            .map_err(|e| RemoteError::Transport(format!("malformed API error: {e}")))?;
        return Err(RemoteError::api(body.code, body.info));
    }
    serde_json::from_value(value)
        .map_err(|e| RemoteError::Transport(format!("unexpected API response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(backoff: Duration) -> ApiSession {
        let credentials = Credentials {
            username: "Bot".into(),
            password: String::new(),
            api_url: "http://wiki.test/api.php".into(),
            user_agent: None,
        };
        ApiSession::new(credentials, 3).with_retry_backoff(backoff)
    }

    #[test]
    fn backoff_doubles_and_stops_growing() {
        let session = session(Duration::from_millis(100));
        assert_eq!(session.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(session.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(session.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(session.backoff_delay(9), session.backoff_delay(40));
    }

    #[test]
    fn format_params_come_first() {
        let params = with_format(&[("action", "query")]);
        assert_eq!(
            params,
            [("format", "json"), ("formatversion", "2"), ("action", "query")]
        );
    }

    #[test]
    fn revision_response_parses_formatversion_2() {
        let body = serde_json::json!({
            "batchcomplete": true,
            "query": { "pages": [{
                "pageid": 7, "ns": 828, "title": "Module:Util",
                "revisions": [{
                    "revid": 42, "parentid": 41, "timestamp": "2024-01-01T00:00:00Z",
                    "slots": { "main": { "contentmodel": "Scribunto", "content": "return {}" } }
                }]
            }]}
        });
        let parsed: RevisionsResponse = serde_json::from_value(body).unwrap();
        let page = &parsed.query.pages[0];
        assert!(!page.missing);
        assert_eq!(page.revisions[0].revid, 42);
        assert_eq!(page.revisions[0].slots.main.content, "return {}");
    }

    #[test]
    fn missing_page_flag_parses() {
        let body = serde_json::json!({
            "query": { "pages": [{ "ns": 0, "title": "Nope", "missing": true }] }
        });
        let parsed: RevisionsResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.query.pages[0].missing);
        assert!(parsed.query.pages[0].revisions.is_empty());
    }
}
