//! Turns provider replies into displayable HTML.
//!
//! Nothing here fails: a bad reply becomes a diagnostic fragment with
//! `succeeded == false` that the UI shows in place of the answer.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::ai::gemini::{HttpReply, ResponseEnvelope};
use crate::error::Error;
use crate::request::RequestKind;

pub const VISION_UNAVAILABLE: &str =
    "The vision model is unavailable. Check that the configured vision model exists and supports image input.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiCallResult {
    pub succeeded: bool,
    /// Answer on success, diagnostic fragment on failure.
    pub html: String,
    pub error_detail: Option<String>,
}

impl AiCallResult {
    pub fn success(html: String) -> Self {
        Self {
            succeeded: true,
            html,
            error_detail: None,
        }
    }

    pub fn failure(kind: RequestKind, summary: &str, guidance: &[&str]) -> Self {
        Self {
            succeeded: false,
            html: diagnostic_fragment(kind, summary, guidance),
            error_detail: Some(summary.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodVerdict {
    Safe,
    Moderate,
    Avoid,
}

impl FoodVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodVerdict::Safe => "Safe",
            FoodVerdict::Moderate => "Moderate",
            FoodVerdict::Avoid => "Avoid",
        }
    }
}

pub fn render(kind: RequestKind, reply: &HttpReply) -> AiCallResult {
    let envelope: Option<ResponseEnvelope> = serde_json::from_str(&reply.body).ok();

    if !reply.is_success() {
        let provider_message = envelope
            .as_ref()
            .and_then(|e| e.error.as_ref())
            .map(|e| e.message.trim().to_string())
            .filter(|m| !m.is_empty());
        let summary = match provider_message {
            Some(message) => format!("Request failed ({}): {}", reply.status, message),
            None => format!("Request failed with HTTP status {}", reply.status),
        };
        warn!(kind = kind.as_str(), status = reply.status, "provider returned an error");
        return AiCallResult::failure(kind, &summary, &guidance_for_status(kind, reply.status));
    }

    let Some(envelope) = envelope else {
        warn!(kind = kind.as_str(), "provider reply is not valid JSON");
        return AiCallResult::failure(
            kind,
            "The AI service sent a response that could not be read.",
            &[UNEXPECTED_RESPONSE, GENERAL_RETRY],
        );
    };

    let Some(text) = envelope.first_text() else {
        let summary = match envelope.finish_reason() {
            Some(reason) => format!("The AI service returned no answer (finish reason: {}).", reason),
            None => "The AI service returned no answer.".to_string(),
        };
        warn!(kind = kind.as_str(), "provider reply has no candidate text");
        return AiCallResult::failure(kind, &summary, &[UNEXPECTED_RESPONSE, GENERAL_RETRY]);
    };

    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return AiCallResult::failure(
            kind,
            "The AI service returned an empty answer.",
            &[UNEXPECTED_RESPONSE, GENERAL_RETRY],
        );
    }

    AiCallResult::success(cleaned)
}

/// Failure raised before any reply existed (transport exhausted, bad input).
pub fn render_error(kind: RequestKind, error: &Error) -> AiCallResult {
    let summary = error.to_string();
    match error {
        Error::RetriesExhausted { .. } => {
            AiCallResult::failure(kind, &summary, &[NETWORK, GENERAL_RETRY])
        }
        _ => AiCallResult::failure(kind, &summary, &[GENERAL_RETRY]),
    }
}

/// Remove markdown code fences that leak into HTML answers, then trim.
pub fn strip_code_fences(text: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("valid fence pattern"));
    fence.replace_all(text, "").trim().to_string()
}

/// Verdict line of a food-scan answer, if the model followed the layout.
pub fn food_verdict(html: &str) -> Option<FoodVerdict> {
    static VERDICT: OnceLock<Regex> = OnceLock::new();
    let pattern = VERDICT.get_or_init(|| {
        Regex::new(r"(?i)verdict\s*:?\s*(?:</strong>|</b>)?\s*:?\s*(safe|moderate|avoid)")
            .expect("valid verdict pattern")
    });
    let captured = pattern.captures(html)?.get(1)?.as_str().to_lowercase();
    match captured.as_str() {
        "safe" => Some(FoodVerdict::Safe),
        "moderate" => Some(FoodVerdict::Moderate),
        "avoid" => Some(FoodVerdict::Avoid),
        _ => None,
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const GENERAL_RETRY: &str = "Wait a few seconds and try again.";
const NETWORK: &str = "Check your internet connection; the AI service could not be reached.";
const UNEXPECTED_RESPONSE: &str = "The answer may have been blocked or cut short. Try rephrasing or using a clearer image.";
const RATE_LIMITED: &str = "The free tier allows only a few requests per minute. Wait about a minute before retrying.";
const API_KEY: &str = "Check that your Gemini API key is set (press K, or set GEMINI_API_KEY) and is still valid.";
const MODEL_MISSING: &str = "The configured model was not found. Check the model name in your config file.";
const SERVER: &str = "The AI service is having trouble right now. Try again later.";

fn guidance_for_status(kind: RequestKind, status: u16) -> Vec<&'static str> {
    match status {
        404 if kind == RequestKind::FoodImage => vec![VISION_UNAVAILABLE, MODEL_MISSING],
        404 => vec![MODEL_MISSING],
        429 => vec![RATE_LIMITED],
        400 | 401 | 403 => vec![API_KEY, GENERAL_RETRY],
        500..=599 => vec![SERVER, GENERAL_RETRY],
        _ => vec![GENERAL_RETRY],
    }
}

fn diagnostic_fragment(kind: RequestKind, summary: &str, guidance: &[&str]) -> String {
    let title = match kind {
        RequestKind::Report => "Could not analyze the report",
        RequestKind::Chat => "Could not reach the assistant",
        RequestKind::FoodImage => "Could not identify the food",
    };

    let mut html = String::new();
    html.push_str("<div style=\"color:#a94442; padding:10px; border:1px solid #a94442;\">\n");
    html.push_str(&format!("  <h3>⚠️ {}</h3>\n", title));
    html.push_str(&format!("  <p><strong>Error:</strong> {}</p>\n", escape_html(summary)));
    html.push_str("  <p><strong>Troubleshooting:</strong></p>\n  <ul>\n");
    for tip in guidance {
        html.push_str(&format!("    <li>{}</li>\n", tip));
    }
    html.push_str("  </ul>\n</div>");
    html
}
