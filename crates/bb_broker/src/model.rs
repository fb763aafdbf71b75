use std::time::Duration;

use http::{header, HeaderMap, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAdvice {
    pub wait: Duration,
    pub reason: &'static str,
}

pub fn parse_retry_after(headers: &HeaderMap) -> Option<RetryAdvice> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(RetryAdvice {
            wait: Duration::from_secs(seconds),
            reason: "retry_after",
        });
    }
    let date = httpdate::parse_http_date(value).ok()?;
    let wait = date.duration_since(std::time::SystemTime::now()).ok()?;
    Some(RetryAdvice {
        wait,
        reason: "retry_after_date",
    })
}

/// What the broker should do with a response status besides returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDisposition {
    Success,
    Unauthorized,
    Retryable(&'static str),
    Fatal,
}

impl StatusDisposition {
    pub fn classify(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Self::Retryable("rate_limited")
        } else if status.is_server_error() {
            Self::Retryable("server_error")
        } else {
            Self::Fatal
        }
    }
}

pub fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
