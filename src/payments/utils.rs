use crate::payments::error::{GatewayError, GatewayResult};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// Why an HTTP call to the gateway did not yield a usable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// The gateway answered with a non-2xx status. `message` is the
    /// provider's own message when the body carried one.
    Status { status: u16, message: String },
    /// Transport or decoding failure. The request may have been applied.
    Transport(GatewayError),
}

impl HttpFailure {
    /// Status failures that no operation-specific rule claimed.
    pub fn into_default_error(self) -> GatewayError {
        match self {
            HttpFailure::Transport(err) => err,
            HttpFailure::Status { status, message } if status == 429 || status >= 500 => {
                GatewayError::Unavailable {
                    message: format!("HTTP {}: {}", status, message),
                }
            }
            HttpFailure::Status { status, message } => GatewayError::Rejected {
                message,
                provider_code: Some(status.to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> GatewayResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| GatewayError::Unavailable {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// Send a request and decode the JSON body.
    ///
    /// Only GET is retried. A POST that times out may already have moved
    /// money, so the caller has to look the outcome up instead.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> Result<T, HttpFailure> {
        let max_retries = if method == Method::GET {
            self.max_retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let failure = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            HttpFailure::Transport(GatewayError::UnexpectedResponse {
                                message: format!("invalid provider JSON response: {}", e),
                            })
                        });
                    }
                    HttpFailure::Status {
                        status: status.as_u16(),
                        message: provider_message(&text),
                    }
                }
                Err(e) if e.is_timeout() => HttpFailure::Transport(GatewayError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }),
                Err(e) => HttpFailure::Transport(GatewayError::Unavailable {
                    message: format!("provider request failed: {}", e),
                }),
            };

            let retryable = match &failure {
                HttpFailure::Status { status, .. } => *status == 429 || *status >= 500,
                HttpFailure::Transport(_) => true,
            };

            if retryable && attempt < max_retries {
                warn!(
                    method = %method,
                    attempt = attempt + 1,
                    failure = ?failure,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(250 << attempt)).await;
                attempt += 1;
                continue;
            }

            return Err(failure);
        }
    }
}

/// Pull `message` out of a provider error body, falling back to the raw text.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub fn verify_hmac_sha512_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature.trim().to_lowercase().as_bytes())
}

pub fn sign_hmac_sha512_hex(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Constant-time comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn signed_payload_verifies() {
        let payload = br#"{"event":"transfer.success"}"#;
        let signature = sign_hmac_sha512_hex(payload, "secret");
        assert!(verify_hmac_sha512_hex(payload, "secret", &signature));
        assert!(!verify_hmac_sha512_hex(payload, "other", &signature));
        assert!(!verify_hmac_sha512_hex(payload, "secret", "not-a-valid-signature"));
    }

    #[test]
    fn provider_message_prefers_json_message() {
        assert_eq!(
            provider_message(r#"{"status":false,"message":"Invalid OTP"}"#),
            "Invalid OTP"
        );
        assert_eq!(provider_message("  bad gateway "), "bad gateway");
    }

    #[test]
    fn unclaimed_status_failures_split_on_server_side() {
        let err = HttpFailure::Status {
            status: 503,
            message: "down".to_string(),
        }
        .into_default_error();
        assert!(matches!(err, GatewayError::Unavailable { .. }));

        let err = HttpFailure::Status {
            status: 400,
            message: "nope".to_string(),
        }
        .into_default_error();
        assert!(matches!(err, GatewayError::Rejected { .. }));
    }
}
