//! Cookie-consent wall detection and bypass.
//!
//! The portal's CMP interposes an interstitial on `consent.yahoo.com` in
//! front of the requested page. Detection keys off the response URL host;
//! bypass reconstructs the interstitial's form and POSTs an acceptance.
//! One detect-and-submit step per call — whether the wall actually cleared
//! is the caller's judgment, via `is_consent_url` on the returned response.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::{ConsentForm, FormField, PageResponse};

const CONSENT_HOST_SUFFIX: &str = "consent.yahoo.com";

/// Field name → submitted value. Duplicate names collapse, last wins.
pub type AcceptancePayload = HashMap<String, String>;

// ── Session collaborator ──────────────────────────────────────────────────────

/// HTTP session contract for the consent POST. Implementations must follow
/// redirects and share cookies with subsequent page fetches.
#[async_trait]
pub trait HttpSession: Send + Sync {
    async fn post_form(
        &self,
        url: &str,
        payload: &AcceptancePayload,
        referer: &str,
        timeout: Duration,
    ) -> Result<PageResponse>;
}

// ── Detection ─────────────────────────────────────────────────────────────────

/// True iff the URL's host ends with the consent domain suffix.
/// Fails closed: malformed URLs and hostless URLs are not challenges.
pub fn is_consent_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.ends_with(CONSENT_HOST_SUFFIX)))
        .unwrap_or(false)
}

// ── Form reconstruction ───────────────────────────────────────────────────────

/// Form selection strategy. The CMP is assumed to render exactly one
/// relevant form, so the default picks the first one on the page.
pub type FormSelect = for<'a> fn(&'a Html) -> Option<ElementRef<'a>>;

pub fn first_form<'a>(doc: &'a Html) -> Option<ElementRef<'a>> {
    let sel = Selector::parse("form").ok()?;
    doc.select(&sel).next()
}

/// Best-effort heuristic for an affirmative consent field, tied to the
/// markup observed on the portal — not a guaranteed semantic match.
pub fn is_affirmative_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered.contains("agree") || lowered.contains("accept")
}

/// Reconstruct the consent form from a challenge page. Returns `None` when
/// the selected strategy finds no form. The action falls back to the
/// challenge URL and relative actions resolve against it.
pub fn parse_consent_form(html: &str, base_url: &str, select: FormSelect) -> Option<ConsentForm> {
    let doc = Html::parse_document(html);
    let form = select(&doc)?;

    let base = Url::parse(base_url).ok()?;
    let action = match form.value().attr("action").filter(|a| !a.is_empty()) {
        Some(action) => base.join(action).ok()?,
        None => base,
    };

    let input_sel = Selector::parse("input").ok()?;
    let mut fields = Vec::new();
    for input in form.select(&input_sel) {
        let el = input.value();
        let Some(name) = el.attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        fields.push(FormField {
            name: name.to_string(),
            kind: el.attr("type").unwrap_or("text").to_lowercase(),
            value: el.attr("value").unwrap_or("").to_string(),
            checked: el.attr("checked").is_some(),
        });
    }

    Some(ConsentForm { action, fields })
}

/// Derive the submission payload from a reconstructed form.
///
/// Checkboxes and radios are included only when their name is affirmative
/// or the field is already checked; an empty declared value becomes "1".
/// Everything else (hidden tokens, session ids, …) is carried verbatim.
/// A synthesized `agree=1` guarantees an affirmative signal even when the
/// markup labels none.
pub fn acceptance_payload(form: &ConsentForm) -> AcceptancePayload {
    let mut payload = AcceptancePayload::new();

    for field in &form.fields {
        match field.kind.as_str() {
            "checkbox" | "radio" => {
                if is_affirmative_name(&field.name) || field.checked {
                    let value = if field.value.is_empty() {
                        "1".to_string()
                    } else {
                        field.value.clone()
                    };
                    payload.insert(field.name.clone(), value);
                }
            }
            _ => {
                payload.insert(field.name.clone(), field.value.clone());
            }
        }
    }

    if !payload.keys().any(|name| is_affirmative_name(name)) {
        payload.insert("agree".to_string(), "1".to_string());
    }

    payload
}

// ── Submission ────────────────────────────────────────────────────────────────

/// Submit the acceptance form of a challenge response.
///
/// A challenge page without a form is a silent pass-through: the original
/// response comes back unchanged. Otherwise the payload is POSTed to the
/// resolved action with a `Referer` of the challenge URL — some servers
/// require it as a simple CSRF check. The server's response is returned
/// as-is, with no verification that the wall was cleared.
pub async fn submit(
    session: &dyn HttpSession,
    challenge: &PageResponse,
    timeout: Duration,
) -> Result<PageResponse> {
    let Some(form) = parse_consent_form(&challenge.text, &challenge.url, first_form) else {
        debug!("No form on consent page — passing response through");
        return Ok(challenge.clone());
    };

    let payload = acceptance_payload(&form);
    debug!(
        "Submitting consent form to {} ({} fields)",
        form.action,
        payload.len()
    );

    session
        .post_form(form.action.as_str(), &payload, &challenge.url, timeout)
        .await
        .context("Consent form submission failed")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    #[test]
    fn test_is_consent_url() {
        assert!(is_consent_url("https://consent.yahoo.com/show"));
        assert!(is_consent_url("https://guce.consent.yahoo.com/copyConsent?x=1"));
        assert!(!is_consent_url("https://finance.yahoo.com/x"));
        assert!(!is_consent_url("not-a-url"));
        assert!(!is_consent_url(""));
    }

    #[test]
    fn test_is_affirmative_name() {
        assert!(is_affirmative_name("agree"));
        assert!(is_affirmative_name("agreeToTerms"));
        assert!(is_affirmative_name("AcceptAll"));
        assert!(!is_affirmative_name("csrfToken"));
    }

    const CHALLENGE_URL: &str = "https://consent.yahoo.com/v2/collectConsent?sessionId=3_cc";

    fn form_of(html: &str) -> ConsentForm {
        parse_consent_form(html, CHALLENGE_URL, first_form).unwrap()
    }

    #[test]
    fn test_hidden_token_gets_synthesized_agree() {
        let form = form_of(
            r#"<form action="/v2/collectConsent"><input name="csrfToken" type="hidden" value="abc"></form>"#,
        );
        let payload = acceptance_payload(&form);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["csrfToken"], "abc");
        assert_eq!(payload["agree"], "1");
    }

    #[test]
    fn test_unchecked_affirmative_checkbox_included_as_1() {
        let form = form_of(r#"<form><input name="agreeToTerms" type="checkbox"></form>"#);
        let payload = acceptance_payload(&form);
        assert_eq!(payload["agreeToTerms"], "1");
        // No synthesized "agree": the checkbox already carries the signal
        assert!(!payload.contains_key("agree"));
    }

    #[test]
    fn test_checkbox_gating() {
        let form = form_of(
            r#"<form>
                <input name="marketing" type="checkbox" value="yes">
                <input name="analytics" type="checkbox" value="yes" checked>
            </form>"#,
        );
        let payload = acceptance_payload(&form);
        assert!(!payload.contains_key("marketing"));
        assert_eq!(payload["analytics"], "yes");
        assert_eq!(payload["agree"], "1");
    }

    #[test]
    fn test_nameless_inputs_skipped_and_duplicates_keep_last() {
        let form = form_of(
            r#"<form>
                <input type="hidden" value="orphan">
                <input name="namespace" type="hidden" value="first">
                <input name="namespace" type="hidden" value="second">
            </form>"#,
        );
        assert_eq!(form.fields.len(), 2);
        let payload = acceptance_payload(&form);
        assert_eq!(payload["namespace"], "second");
    }

    #[test]
    fn test_action_resolution() {
        let relative = form_of(r#"<form action="/v2/collectConsent?step=2"></form>"#);
        assert_eq!(
            relative.action.as_str(),
            "https://consent.yahoo.com/v2/collectConsent?step=2"
        );

        let absolute = form_of(r#"<form action="https://guce.yahoo.com/consent"></form>"#);
        assert_eq!(absolute.action.as_str(), "https://guce.yahoo.com/consent");

        // No declared action → the challenge URL itself
        let fallback = form_of("<form></form>");
        assert_eq!(fallback.action.as_str(), CHALLENGE_URL);
    }

    #[test]
    fn test_formless_page_yields_no_form() {
        assert!(parse_consent_form("<html><body>wall</body></html>", CHALLENGE_URL, first_form)
            .is_none());
    }

    struct RecordingSession {
        posts: Mutex<Vec<(String, AcceptancePayload, String)>>,
    }

    #[async_trait]
    impl HttpSession for RecordingSession {
        async fn post_form(
            &self,
            url: &str,
            payload: &AcceptancePayload,
            referer: &str,
            _timeout: Duration,
        ) -> Result<PageResponse> {
            self.posts.lock().unwrap().push((
                url.to_string(),
                payload.clone(),
                referer.to_string(),
            ));
            Ok(PageResponse {
                url: "https://finance.yahoo.com/calendar/earnings".to_string(),
                status: StatusCode::OK,
                text: "cleared".to_string(),
            })
        }
    }

    fn challenge(text: &str) -> PageResponse {
        PageResponse {
            url: CHALLENGE_URL.to_string(),
            status: StatusCode::OK,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_submit_posts_with_referer() {
        let session = RecordingSession {
            posts: Mutex::new(Vec::new()),
        };
        let challenge = challenge(
            r#"<form action="/v2/collectConsent"><input name="csrfToken" type="hidden" value="abc"></form>"#,
        );

        let response =
            tokio_test::block_on(submit(&session, &challenge, Duration::from_secs(5))).unwrap();
        assert_eq!(response.text, "cleared");

        let posts = session.posts.lock().unwrap();
        let (url, payload, referer) = &posts[0];
        assert_eq!(url, "https://consent.yahoo.com/v2/collectConsent");
        assert_eq!(payload["csrfToken"], "abc");
        assert_eq!(referer, CHALLENGE_URL);
    }

    #[test]
    fn test_submit_without_form_returns_challenge_unchanged() {
        let session = RecordingSession {
            posts: Mutex::new(Vec::new()),
        };
        let challenge = challenge("<html><body>no form here</body></html>");

        let response =
            tokio_test::block_on(submit(&session, &challenge, Duration::from_secs(5))).unwrap();
        assert_eq!(response.url, challenge.url);
        assert_eq!(response.text, challenge.text);
        assert!(session.posts.lock().unwrap().is_empty());
    }
}
