//! Hosted label classifiers (bearer token, raw bytes in, labels out).

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;
use vigil_models::LabelScore;

use crate::error::{MlClientError, MlClientResult};

/// A hosted inference endpoint returning `[{label, score}]`.
///
/// Some image endpoints wrap the list once more (`[[{label, score}]]`);
/// both shapes are accepted.
#[derive(Clone)]
pub struct HostedClassifier {
    http: Client,
    url: String,
    token: String,
}

impl HostedClassifier {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> MlClientResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("vigil-ml-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            token: token.into(),
        })
    }

    /// Build a classifier only when both URL and token are present and non-empty.
    pub fn from_parts(url: Option<String>, token: Option<String>) -> MlClientResult<Option<Self>> {
        match (
            url.filter(|u| !u.trim().is_empty()),
            token.filter(|t| !t.trim().is_empty()),
        ) {
            (Some(url), Some(token)) => Self::new(url, token).map(Some),
            _ => Ok(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn classify(&self, data: &[u8], content_type: &str) -> MlClientResult<Vec<LabelScore>> {
        debug!(bytes = data.len(), content_type, "Calling hosted classifier");
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .header("Content-Type", content_type)
            .body(data.to_vec())
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(MlClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_slice(&resp.bytes()?)
            .map_err(|e| MlClientError::invalid_response(e.to_string()))?;
        parse_labels(value)
    }
}

fn parse_labels(value: Value) -> MlClientResult<Vec<LabelScore>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let msg = map
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("expected a list of labels")
                .to_string();
            return Err(MlClientError::invalid_response(msg));
        }
        _ => return Err(MlClientError::invalid_response("expected a list of labels")),
    };

    let items = match items.first() {
        Some(Value::Array(_)) => match items.into_iter().next() {
            Some(Value::Array(inner)) => inner,
            _ => Vec::new(),
        },
        _ => items,
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<LabelScore>(item)
                .map_err(|e| MlClientError::invalid_response(e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_flat_and_nested_lists() {
        let flat = parse_labels(json!([{"label": "happy", "score": 0.7}])).unwrap();
        assert_eq!(flat, vec![LabelScore::new("happy", 0.7)]);

        let nested = parse_labels(json!([[{"label": "sad", "score": 0.4}]])).unwrap();
        assert_eq!(nested, vec![LabelScore::new("sad", 0.4)]);

        assert!(parse_labels(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_error_object_is_invalid_response() {
        let err = parse_labels(json!({"error": "Model is loading"})).unwrap_err();
        assert!(err.to_string().contains("Model is loading"));
        assert!(parse_labels(json!([{"nope": 1}])).is_err());
    }

    #[test]
    fn test_from_parts_requires_both() {
        assert!(HostedClassifier::from_parts(Some("http://x".into()), None)
            .unwrap()
            .is_none());
        assert!(HostedClassifier::from_parts(Some("http://x".into()), Some(" ".into()))
            .unwrap()
            .is_none());
        assert!(HostedClassifier::from_parts(Some("http://x".into()), Some("t".into()))
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_classify_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/emotion"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "image/jpeg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"label": "neutral", "score": 0.55}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/models/emotion", server.uri());
        let labels = tokio::task::spawn_blocking(move || {
            HostedClassifier::new(url, "secret")
                .unwrap()
                .classify(b"\xff\xd8jpeg", "image/jpeg")
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(labels, vec![LabelScore::new("neutral", 0.55)]);
    }
}
