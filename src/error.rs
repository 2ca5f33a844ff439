use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("hand-tracking runtime did not become available within {0:?}")]
    LibraryLoadTimeout(Duration),
    #[error("hand-tracking runtime failed to initialize: {0:#}")]
    RuntimeInit(anyhow::Error),
    #[error("camera could not be started (primary: {primary:#}; fallback: {fallback:#})")]
    CameraStart {
        primary: anyhow::Error,
        fallback: anyhow::Error,
    },
    #[error("frame pipeline failed: {0}")]
    FramePipeline(String),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no landmarks to send")]
    NoLandmarks,
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server error: {status}{}", body_suffix(.body))]
    Server { status: u16, body: Option<String> },
    #[error("backend returned an unreadable response: {0}")]
    InvalidResponse(#[source] reqwest::Error),
}

fn body_suffix(body: &Option<String>) -> String {
    match body.as_deref() {
        Some(text) if !text.is_empty() => format!(" - {text}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_mentions_status_and_body() {
        let err = SubmitError::Server {
            status: 500,
            body: Some("oops".to_string()),
        };
        assert_eq!(err.to_string(), "server error: 500 - oops");

        let err = SubmitError::Server {
            status: 404,
            body: None,
        };
        assert_eq!(err.to_string(), "server error: 404");
    }
}
