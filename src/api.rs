// Portal client module: a small blocking HTTP client that logs in to the
// provider's portal and submits a refill request on the same session.
// The session lives in reqwest's cookie store, so the cookie set by the
// login response is replayed on the refill call without us touching it.

use crate::config::Config;
use crate::error::{RefillError, Result, Step};
use reqwest::blocking::{Client, Response};
use reqwest::header::{LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Longest slice of a response body carried in an error message.
const MAX_BODY_IN_ERROR: usize = 200;

/// Where a client is in its single run. There is no way back to
/// `Unauthenticated`: a new run means a new client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Completed,
    Failed,
}

/// Login form payload. No `Debug`: it carries the password.
#[derive(Serialize)]
struct LoginForm<'a> {
    office: &'a str,
    username: &'a str,
    password: &'a str,
}

/// Refill form payload. The portal treats refills as a message of type
/// "R" with empty subject text.
#[derive(Serialize, Debug, PartialEq)]
pub struct RefillRequest<'a> {
    pub meds: &'a str,
    pub office: &'a str,
    pub subject: &'a str,
    pub reply: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub msg: &'a str,
}

impl<'a> RefillRequest<'a> {
    pub fn from_config(config: &'a Config) -> Self {
        RefillRequest {
            meds: &config.med_id,
            office: &config.office,
            subject: "R",
            reply: "",
            kind: "R",
            msg: "",
        }
    }
}

/// A refill the portal accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillResult {
    pub status: u16,
    /// Message from the portal, if the body carried one.
    pub message: Option<String>,
}

/// Optional JSON body some portal endpoints answer with. The status code
/// is what decides success; this only adds detail on top of it.
#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct PortalReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PortalReply {
    /// Parse a body. Non-JSON bodies yield an empty reply.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// The provider's error text, if the body signals failure.
    pub fn error_indicator(&self) -> Option<String> {
        if let Some(err) = self.error.as_deref().filter(|e| !e.trim().is_empty()) {
            return Some(err.to_string());
        }
        let failed = self.status.as_deref().map_or(false, |s| {
            matches!(
                s.to_ascii_lowercase().as_str(),
                "error" | "fail" | "failed" | "failure"
            )
        });
        if failed {
            Some(
                self.message
                    .clone()
                    .unwrap_or_else(|| "portal reported failure".to_string()),
            )
        } else {
            None
        }
    }
}

/// Holds the HTTP session and the borrowed config for one run.
pub struct RefillerClient<'a> {
    client: Client,
    config: &'a Config,
    state: SessionState,
}

impl<'a> RefillerClient<'a> {
    /// Build the client. No request is sent yet.
    pub fn new(config: &'a Config) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(config.timeout())
            .user_agent(concat!("refiller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| RefillError::Transport { step: Step::Setup, source })?;
        Ok(RefillerClient {
            client,
            config,
            state: SessionState::Unauthenticated,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// POST the credentials to the login endpoint. On success the session
    /// cookie is kept in the client's cookie store.
    pub fn login(&mut self) -> Result<()> {
        if self.state != SessionState::Unauthenticated {
            return Err(RefillError::Precondition(format!(
                "login called in state {:?}",
                self.state
            )));
        }
        let result = self.try_login();
        self.state = match &result {
            Ok(()) => SessionState::Authenticated,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn try_login(&self) -> Result<()> {
        let url = self.config.login_url();
        let form = LoginForm {
            office: &self.config.office,
            username: &self.config.username,
            password: &self.config.password,
        };
        debug!(%url, username = %self.config.username, office = %self.config.office, "sending login request");

        let res = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|source| RefillError::Transport { step: Step::Login, source })?;

        let status = res.status();
        let location = header_str(&res, LOCATION);
        let sets_cookie = res.headers().contains_key(SET_COOKIE);
        let body = read_body(res, Step::Login)?;

        if status.is_redirection() {
            if let Some(target) = location.as_deref().filter(|l| points_to_login_page(l)) {
                return Err(RefillError::Authentication {
                    status: Some(status.as_u16()),
                    reason: format!("redirected back to {}", target),
                });
            }
        } else if !status.is_success() {
            return Err(RefillError::Authentication {
                status: Some(status.as_u16()),
                reason: failure_text(status, &body),
            });
        }
        if !sets_cookie {
            return Err(RefillError::Authentication {
                status: Some(status.as_u16()),
                reason: "no session cookie received".into(),
            });
        }
        if let Some(err) = PortalReply::parse(&body).error_indicator() {
            return Err(RefillError::Authentication {
                status: Some(status.as_u16()),
                reason: err,
            });
        }

        info!(status = status.as_u16(), "login accepted");
        Ok(())
    }

    /// Submit the refill for the configured office and medication on the
    /// logged-in session.
    pub fn request_refill(&mut self) -> Result<RefillResult> {
        if self.state != SessionState::Authenticated {
            return Err(RefillError::Precondition(format!(
                "request_refill requires a successful login (state is {:?})",
                self.state
            )));
        }
        let result = self.try_refill();
        self.state = match &result {
            Ok(_) => SessionState::Completed,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn try_refill(&self) -> Result<RefillResult> {
        let url = self.config.refill_url();
        let form = RefillRequest::from_config(self.config);
        debug!(%url, med_id = %form.meds, office = %form.office, "sending refill request");

        let res = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|source| RefillError::Transport { step: Step::Refill, source })?;

        let status = res.status();
        let location = header_str(&res, LOCATION);
        let body = read_body(res, Step::Refill)?;

        if status.is_redirection() {
            if let Some(target) = location.as_deref().filter(|l| points_to_login_page(l)) {
                return Err(RefillError::Authentication {
                    status: Some(status.as_u16()),
                    reason: format!("session rejected, redirected to {}", target),
                });
            }
            // Post/redirect/get: the message was stored, the portal sends us on.
            info!(status = status.as_u16(), location = location.as_deref().unwrap_or(""), "refill request accepted");
            return Ok(RefillResult {
                status: status.as_u16(),
                message: None,
            });
        }
        if !status.is_success() {
            return Err(RefillError::Submission {
                status: Some(status.as_u16()),
                message: failure_text(status, &body),
            });
        }

        let reply = PortalReply::parse(&body);
        if let Some(message) = reply.error_indicator() {
            warn!(status = status.as_u16(), "portal answered 2xx but reported an error");
            return Err(RefillError::Submission {
                status: Some(status.as_u16()),
                message,
            });
        }

        info!(status = status.as_u16(), "refill request accepted");
        Ok(RefillResult {
            status: status.as_u16(),
            message: reply.message,
        })
    }
}

fn header_str(res: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn read_body(res: Response, step: Step) -> Result<String> {
    res.text()
        .map_err(|source| RefillError::Transport { step, source })
}

/// True when a redirect target looks like the login or error page.
pub fn points_to_login_page(location: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.split('/').any(|segment| {
        let segment = segment.to_ascii_lowercase();
        segment.contains("login") || segment.contains("signin") || segment.contains("error")
    })
}

/// Describe a non-2xx answer: provider message if any, else a body excerpt,
/// else the status reason.
fn failure_text(status: StatusCode, body: &str) -> String {
    let reply = PortalReply::parse(body);
    if let Some(text) = reply.error_indicator().or(reply.message) {
        return text;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string();
    }
    trimmed.chars().take(MAX_BODY_IN_ERROR).collect()
}
