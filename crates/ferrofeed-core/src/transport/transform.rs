//! Request/response transform pipeline.
//!
//! Transforms run in registration order. Request transforms see the request
//! after auth injection; response transforms see successful responses only.
//! Returning an error rejects the in-flight value.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::http_client::{HttpRequest, HttpResponse};
use crate::transport::TransportError;

pub trait RequestTransform: Send + Sync {
    fn apply(&self, request: &mut HttpRequest) -> Result<(), TransportError>;
}

pub trait ResponseTransform: Send + Sync {
    fn apply(&self, response: &mut HttpResponse) -> Result<(), TransportError>;
}

impl<F> RequestTransform for F
where
    F: Fn(&mut HttpRequest) -> Result<(), TransportError> + Send + Sync,
{
    fn apply(&self, request: &mut HttpRequest) -> Result<(), TransportError> {
        self(request)
    }
}

impl<F> ResponseTransform for F
where
    F: Fn(&mut HttpResponse) -> Result<(), TransportError> + Send + Sync,
{
    fn apply(&self, response: &mut HttpResponse) -> Result<(), TransportError> {
        self(response)
    }
}

/// Sets a fixed header on every request.
#[derive(Debug, Clone)]
pub struct HeaderInjector {
    name: String,
    value: String,
}

impl HeaderInjector {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl RequestTransform for HeaderInjector {
    fn apply(&self, request: &mut HttpRequest) -> Result<(), TransportError> {
        request.set_header(self.name.as_str(), self.value.as_str());
        Ok(())
    }
}

/// Appends a fixed query parameter, for upstreams that take keys in the URL.
#[derive(Clone)]
pub struct QueryParamInjector {
    name: String,
    value: String,
}

impl QueryParamInjector {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for QueryParamInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryParamInjector")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

impl RequestTransform for QueryParamInjector {
    fn apply(&self, request: &mut HttpRequest) -> Result<(), TransportError> {
        request.append_query(&self.name, &self.value);
        Ok(())
    }
}

/// HMAC-SHA256 request signer.
///
/// Canonical form: `METHOD\nURL\nUNIX_SECONDS\nhex(sha256(body))`. The hex
/// signature and timestamp are written to `x-signature` and
/// `x-signature-timestamp`; a key id, if given, goes to `x-signature-key`.
pub struct HmacSigner {
    key_id: Option<String>,
    secret: Vec<u8>,
    clock: fn() -> i64,
}

impl HmacSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: None,
            secret: secret.into(),
            clock: unix_now,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn canonical_string(request: &HttpRequest, timestamp: i64) -> String {
        let body_digest = hex::encode(Sha256::digest(
            request.body.as_deref().unwrap_or_default().as_bytes(),
        ));
        format!(
            "{}\n{}\n{}\n{}",
            request.method.as_str(),
            request.url,
            timestamp,
            body_digest
        )
    }

    pub fn sign(&self, message: &[u8]) -> Result<String, TransportError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TransportError::unknown(format!("invalid signing key: {e}")))?;
        mac.update(message);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl RequestTransform for HmacSigner {
    fn apply(&self, request: &mut HttpRequest) -> Result<(), TransportError> {
        let timestamp = (self.clock)();
        let signature = self.sign(Self::canonical_string(request, timestamp).as_bytes())?;

        request.set_header("x-signature", signature);
        request.set_header("x-signature-timestamp", timestamp.to_string());
        if let Some(key_id) = &self.key_id {
            request.set_header("x-signature-key", key_id.as_str());
        }
        Ok(())
    }
}

/// Replaces a JSON response body with one of its top-level fields, e.g. to
/// strip a `{"data": ...}` envelope.
#[derive(Debug, Clone)]
pub struct UnwrapJsonField {
    field: String,
}

impl UnwrapJsonField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl ResponseTransform for UnwrapJsonField {
    fn apply(&self, response: &mut HttpResponse) -> Result<(), TransportError> {
        let mut value: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| TransportError::unknown(format!("response is not JSON: {e}")))?;

        let inner = value
            .get_mut(self.field.as_str())
            .map(serde_json::Value::take)
            .ok_or_else(|| {
                TransportError::unknown(format!("response has no '{}' field", self.field))
            })?;

        response.body = inner.to_string();
        Ok(())
    }
}

type HmacSha256 = Hmac<Sha256>;

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpMethod;

    #[test]
    fn hmac_matches_rfc4231_case_1() {
        let signer = HmacSigner::new(vec![0x0b; 20]);
        assert_eq!(
            signer.sign(b"Hi There").expect("signs"),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let signer = HmacSigner::new(b"Jefe".to_vec());
        assert_eq!(
            signer.sign(b"what do ya want for nothing?").expect("signs"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn hmac_hashes_keys_longer_than_a_block() {
        let signer = HmacSigner::new(vec![0xaa; 131]);
        assert_eq!(
            signer
                .sign(b"Test Using Larger Than Block-Size Key - Hash Key First")
                .expect("signs"),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn signer_sets_signature_headers() {
        let signer = HmacSigner::new(b"secret".to_vec())
            .with_key_id("key-1")
            .with_clock(|| 1_700_000_000);
        let mut request = HttpRequest::new(HttpMethod::Post, "https://example.test/orders")
            .with_body("{\"qty\":1}");

        signer.apply(&mut request).expect("signs");

        let expected = signer
            .sign(HmacSigner::canonical_string(&request, 1_700_000_000).as_bytes())
            .expect("signs");
        assert_eq!(request.header("x-signature"), Some(expected.as_str()));
        assert_eq!(request.header("x-signature-timestamp"), Some("1700000000"));
        assert_eq!(request.header("x-signature-key"), Some("key-1"));
    }

    #[test]
    fn unwrap_json_field_reshapes_body() {
        let mut response = HttpResponse::ok_json(r#"{"data":[1,2,3],"meta":{}}"#);
        UnwrapJsonField::new("data")
            .apply(&mut response)
            .expect("unwraps");
        assert_eq!(response.body, "[1,2,3]");
    }

    #[test]
    fn unwrap_json_field_rejects_missing_field() {
        let mut response = HttpResponse::ok_json(r#"{"meta":{}}"#);
        assert!(UnwrapJsonField::new("data").apply(&mut response).is_err());
    }
}
