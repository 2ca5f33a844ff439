use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::SubmitError,
    types::{AnchorSnapshot, Landmark},
};

pub const NO_LANDMARKS_MESSAGE: &str =
    "No landmarks detected. Please bring your hand closer to the camera.";
pub const SEND_FAILED_MESSAGE: &str =
    "Failed to send landmarks. Check the connection to the backend.";
pub const SEND_OK_MESSAGE: &str = "Landmarks sent successfully!";

const CAPTURE_TYPE: &str = "hand";
const DEVICE_ID: &str = "web_camera";

#[derive(Debug, Serialize)]
pub struct SubmissionPayload<'a> {
    pub sign_id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub device_id: &'static str,
    pub timestamp: String,
    pub landmarks: &'a [Landmark],
    pub pose_anchors: AnchorSnapshot,
}

impl<'a> SubmissionPayload<'a> {
    pub fn new(landmarks: &'a [Landmark], pose_anchors: AnchorSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            sign_id: format!("sign_{}", now.timestamp_millis()),
            kind: CAPTURE_TYPE,
            device_id: DEVICE_ID,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            landmarks,
            pose_anchors,
        }
    }
}

/// Outcome of one send, as shown to the user.
#[derive(Debug)]
pub enum SubmissionReport {
    /// Nothing was sent because no hand is in view.
    Rejected,
    Accepted(Value),
    Failed(SubmitError),
}

impl SubmissionReport {
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmissionReport::Rejected => NO_LANDMARKS_MESSAGE,
            SubmissionReport::Accepted(_) => SEND_OK_MESSAGE,
            SubmissionReport::Failed(_) => SEND_FAILED_MESSAGE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionReport::Accepted(_))
    }
}

#[derive(Clone, Debug)]
pub struct SubmissionClient {
    http: Client,
    endpoint: String,
}

impl SubmissionClient {
    pub fn new(origin: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: format!("{}/extract", origin.trim_end_matches('/')),
        }
    }

    pub fn submit(&self, landmarks: &[Landmark], pose_anchors: AnchorSnapshot) -> SubmissionReport {
        match self.send(landmarks, pose_anchors) {
            Ok(body) => {
                log::info!("backend response: {body}");
                SubmissionReport::Accepted(body)
            }
            Err(SubmitError::NoLandmarks) => SubmissionReport::Rejected,
            Err(err) => {
                log::error!("failed to send landmarks: {err}");
                SubmissionReport::Failed(err)
            }
        }
    }

    fn send(&self, landmarks: &[Landmark], pose_anchors: AnchorSnapshot) -> Result<Value, SubmitError> {
        if landmarks.is_empty() {
            return Err(SubmitError::NoLandmarks);
        }

        let payload = SubmissionPayload::new(landmarks, pose_anchors, Utc::now());
        log::debug!(
            "sending {} landmarks as {} to {}",
            landmarks.len(),
            payload.sign_id,
            self.endpoint
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .map_err(|source| SubmitError::Transport {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Server {
                status: status.as_u16(),
                body: response.text().ok(),
            });
        }

        response.json().map_err(SubmitError::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoseAnchors;
    use chrono::TimeZone;
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread,
    };

    /// Answers a single request with `status` and `body`, returning the raw
    /// request it received.
    fn one_shot_server(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body_bytes = vec![0; content_length];
            reader.read_exact(&mut body_bytes).unwrap();

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            head + &String::from_utf8(body_bytes).unwrap()
        });
        (origin, handle)
    }

    fn hand() -> Vec<Landmark> {
        (0..21)
            .map(|id| Landmark {
                id,
                x: 0.5,
                y: 0.25,
                z: 0.0,
                visibility: 1.0,
            })
            .collect()
    }

    #[test]
    fn payload_matches_backend_schema() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let landmarks = hand();
        let payload = SubmissionPayload::new(&landmarks[..1], AnchorSnapshot(None), now);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["sign_id"], "sign_1700000000123");
        assert_eq!(json["type"], "hand");
        assert_eq!(json["device_id"], "web_camera");
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20.123Z");
        assert_eq!(
            json["landmarks"][0],
            serde_json::json!({"id": 0, "x": 0.5, "y": 0.25, "z": 0.0, "visibility": 1.0})
        );
        assert_eq!(json["pose_anchors"], serde_json::json!({}));
    }

    #[test]
    fn empty_landmarks_never_hit_the_network() {
        // Nothing listens on this origin; a request would fail as Transport.
        let client = SubmissionClient::new("http://127.0.0.1:9");
        let report = client.submit(&[], AnchorSnapshot(None));
        assert!(matches!(report, SubmissionReport::Rejected));
        assert_eq!(report.user_message(), NO_LANDMARKS_MESSAGE);
    }

    #[test]
    fn accepted_submission_posts_json_to_extract() {
        let (origin, server) = one_shot_server("201 Created", r#"{"ok":true}"#);
        let client = SubmissionClient::new(&format!("{origin}/"));
        let anchors = AnchorSnapshot(Some(PoseAnchors::from_landmarks(&hand())));

        let report = client.submit(&hand(), anchors);
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /extract HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.contains(r#""device_id":"web_camera""#));
        match report {
            SubmissionReport::Accepted(body) => assert_eq!(body, serde_json::json!({"ok": true})),
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn server_error_carries_status_and_body() {
        let (origin, server) = one_shot_server("500 Internal Server Error", "oops");
        let client = SubmissionClient::new(&origin);

        let report = client.submit(&hand(), AnchorSnapshot(None));
        server.join().unwrap();

        assert_eq!(report.user_message(), SEND_FAILED_MESSAGE);
        match report {
            SubmissionReport::Failed(err) => {
                let text = err.to_string();
                assert!(text.contains("500"));
                assert!(text.contains("oops"));
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn unparsable_success_body_is_a_failure() {
        let (origin, server) = one_shot_server("200 OK", "not json");
        let client = SubmissionClient::new(&origin);

        let report = client.submit(&hand(), AnchorSnapshot(None));
        server.join().unwrap();
        assert!(matches!(
            report,
            SubmissionReport::Failed(SubmitError::InvalidResponse(_))
        ));
    }

    #[test]
    fn unreachable_backend_is_a_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let report = SubmissionClient::new(&origin).submit(&hand(), AnchorSnapshot(None));
        assert_eq!(report.user_message(), SEND_FAILED_MESSAGE);
        assert!(!report.is_success());
        assert!(matches!(
            report,
            SubmissionReport::Failed(SubmitError::Transport { .. })
        ));
    }
}
