//! HTTP verification of candidate links
//!
//! One GET per candidate: certificate-validated first, then once more with
//! validation disabled if (and only if) the first attempt failed in the TLS
//! layer. The first response obtained is classified:
//!
//! | response                           | outcome                          |
//! |------------------------------------|----------------------------------|
//! | 401                                | `DENIED: <url> requires login`   |
//! | 403                                | `DENIED: <url> access forbidden` |
//! | 404                                | `MISSING: <url> not found`       |
//! | 200/301/302/307 + PDF              | success (final URL)              |
//! | 200/301/302/307 + anything else    | `DENIED: ... non-PDF content`    |
//! | other status                       | `TXERROR: <status> from <url>`   |
//! | no response                        | `TXERROR: <transport error>`     |

use crate::error::Failure;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use std::error::Error as _;
use std::io::Read;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Bytes read from a candidate to look for the PDF signature
const PDF_SNIFF_BYTES: u64 = 1024;

/// Upper bound on HTML read when scanning for paywall text
const PAGE_SCAN_BYTES: u64 = 512 * 1024;

/// Phrases that mark an article page as access-walled (matched lowercase)
pub const PAYWALL_TERMS: &[&str] = &[
    "paywall",
    "subscribe",
    "sign in",
    "log in to",
    "institutional access",
    "access through your institution",
    "purchase",
    "buy article",
    "rent this article",
    "get access",
];

/// Classifying HTTP fetcher with a fixed timeout and redirect cap
#[derive(Debug, Clone)]
pub struct Verifier {
    timeout: Duration,
    max_redirects: usize,
    user_agent: String,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_MAX_REDIRECTS)
    }
}

impl Verifier {
    pub fn new(timeout: Duration, max_redirects: usize) -> Self {
        Self {
            timeout,
            max_redirects,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn client(&self, accept_invalid_certs: bool) -> Result<Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
    }

    /// GET with the strict client, retrying once leniently on a TLS failure
    fn fetch(&self, url: &str) -> Result<Response, Failure> {
        send_with_tls_fallback(url, |lenient| self.client(lenient)?.get(url).send(), is_tls_error)
            .map_err(|e| Failure::tx_error(describe_transport_error(&e)))
    }

    /// Confirm `url` serves a PDF; returns the final (post-redirect) URL
    pub fn verify_pdf(&self, url: &str) -> Result<String, Failure> {
        let mut response = self.fetch(url)?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = header_str(&response, CONTENT_TYPE);

        let mut head = Vec::with_capacity(PDF_SNIFF_BYTES as usize);
        if let Err(e) = response.by_ref().take(PDF_SNIFF_BYTES).read_to_end(&mut head) {
            tracing::debug!(url, "could not read response body: {}", e);
        }

        let outcome = classify_pdf_response(status, &content_type, &head, url, &final_url);
        tracing::debug!(url, status, content_type = %content_type, ok = outcome.is_ok(), "verified candidate");
        outcome
    }

    /// Check an HTML article page: paywall phrases make it `PAYWALL`,
    /// otherwise a 2xx page counts as accessible
    pub fn check_page(&self, url: &str) -> Result<String, Failure> {
        let response = self.fetch(url)?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if let Some(failure) = classify_error_status(status, url) {
            return Err(failure);
        }
        if !(200..300).contains(&status) {
            return Err(Failure::tx_error(format!("{} from {}", status, url)));
        }

        let mut body = Vec::new();
        response
            .take(PAGE_SCAN_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| Failure::tx_error(format!("reading {}: {}", url, e)))?;

        if detect_paywall(&String::from_utf8_lossy(&body)) {
            return Err(Failure::paywall());
        }
        Ok(final_url)
    }
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn classify_error_status(status: u16, url: &str) -> Option<Failure> {
    match status {
        401 => Some(Failure::denied(format!("{} requires login", url))),
        403 => Some(Failure::denied(format!("{} access forbidden", url))),
        404 => Some(Failure::missing(format!("{} not found", url))),
        _ => None,
    }
}

/// Pure classification of one response; see the module table
pub fn classify_pdf_response(
    status: u16,
    content_type: &str,
    head: &[u8],
    url: &str,
    final_url: &str,
) -> Result<String, Failure> {
    if let Some(failure) = classify_error_status(status, url) {
        return Err(failure);
    }
    match status {
        200 | 301 | 302 | 307 => {
            if is_pdf(content_type, head) {
                Ok(final_url.to_string())
            } else {
                let shown = if content_type.is_empty() { "unknown type" } else { content_type };
                Err(Failure::denied(format!(
                    "{} returned non-PDF content ({})",
                    url, shown
                )))
            }
        }
        other => Err(Failure::tx_error(format!("{} from {}", other, url))),
    }
}

/// PDF magic bytes or a PDF content type
pub fn is_pdf(content_type: &str, head: &[u8]) -> bool {
    head.starts_with(b"%PDF") || content_type.to_ascii_lowercase().contains("pdf")
}

/// Case-insensitive scan for any paywall phrase
pub fn detect_paywall(body: &str) -> bool {
    let lowered = body.to_lowercase();
    PAYWALL_TERMS.iter().any(|term| lowered.contains(term))
}

/// Run `send` strictly; only a TLS-layer failure earns one lenient retry
fn send_with_tls_fallback<T, E, S, P>(url: &str, mut send: S, is_tls: P) -> Result<T, E>
where
    E: std::fmt::Display,
    S: FnMut(bool) -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    match send(false) {
        Err(e) if is_tls(&e) => {
            tracing::warn!(url, "TLS validation failed, retrying without certificate checks: {}", e);
            send(true)
        }
        other => other,
    }
}

/// Walk the error sources (not the top-level message, which embeds the URL)
/// looking for certificate/handshake failures
fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = err.source();
    let mut texts = Vec::new();
    while let Some(inner) = source {
        texts.push(inner.to_string());
        source = inner.source();
    }
    texts.iter().any(|t| mentions_tls(t))
}

fn mentions_tls(text: &str) -> bool {
    let t = text.to_lowercase();
    t.contains("certificate") || t.contains("tls") || t.contains("ssl") || t.contains("handshake")
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection error"
    } else if err.is_redirect() {
        "redirect limit exceeded"
    } else {
        "request failed"
    };
    let url = err.url().map(|u| u.as_str()).unwrap_or("<unknown url>");
    format!("{} for {}: {}", kind, url, err)
}
