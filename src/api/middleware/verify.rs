use std::sync::LazyLock;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request};
use axum::middleware::Next;
use axum::response::Response;
use http::{HeaderMap, StatusCode};
use ring::hmac::{self, Key};
use tokio::sync::OnceCell;

use crate::util::constant_time_cmp;
use crate::util::env::Var;
use crate::var;

pub const HMAC_PREFIX: &str = "sha256=";
pub const REVIEW_EVENT_ID: &str = "x-review-event-id";
pub const REVIEW_EVENT_TIMESTAMP: &str = "x-review-event-timestamp";
pub const REVIEW_EVENT_SIGNATURE: &str = "x-review-event-signature";

static KEY: LazyLock<OnceCell<Key>> = LazyLock::new(OnceCell::new);
async fn hmac_key() -> Result<&'static Key, StatusCode> {
    KEY.get_or_try_init(|| async {
        let secret = var!(Var::ReviewEventSecret)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok(Key::new(hmac::HMAC_SHA256, secret.as_bytes()))
    })
    .await
}

/// Body bytes that passed sender verification, re-exposed to handlers through
/// request extensions since the middleware had to consume the stream.
#[derive(Clone)]
pub struct VerifiedBody(pub Bytes);

impl VerifiedBody {
    pub fn as_json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.0)
    }
}

/// Authenticates the review-management collaborator: HMAC-SHA256 over
/// `event id + timestamp + raw body` with the shared secret, compared in
/// constant time against the signature header.
pub async fn verify_sender_ident(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let headers = req.headers().clone();
    let body = match extract_body(&mut req).await {
        Ok(bytes) => bytes,
        Err(_) => return Err(StatusCode::BAD_REQUEST),
    };

    let key = hmac_key().await?;
    if let Err(status) = verify_signature(key, &headers, &body) {
        tracing::error!(%status, "unable to verify review event signature");
        return Err(status);
    }

    req.extensions_mut().insert(VerifiedBody(body));
    Ok(next.run(req).await)
}

async fn extract_body(request: &mut Request) -> Result<Bytes, ()> {
    let body = std::mem::replace(request.body_mut(), Body::empty());
    axum::body::to_bytes(body, usize::MAX).await.map_err(|_| ())
}

fn verify_signature(key: &Key, headers: &HeaderMap, body: &Bytes) -> Result<(), StatusCode> {
    let (id, timestamp, extern_signature) = get_message_parts(headers)?;
    let rebuilt_message = rebuild_message(id, timestamp, body);

    let expected_signature = {
        let signed = hmac::sign(key, &rebuilt_message);
        format!("{}{}", HMAC_PREFIX, hex::encode(signed))
    };

    if constant_time_cmp(extern_signature, &expected_signature) {
        return Ok(());
    }

    Err(StatusCode::FORBIDDEN)
}

fn rebuild_message(id: &str, ts: &str, body: &Bytes) -> Vec<u8> {
    let mut m = Vec::new();
    m.extend_from_slice(id.as_bytes());
    m.extend_from_slice(ts.as_bytes());
    m.extend_from_slice(body);

    m
}

type MessageParts<'a> = (&'a str, &'a str, &'a str);
fn get_message_parts(headers: &HeaderMap) -> Result<MessageParts<'_>, StatusCode> {
    let id = headers
        .get(REVIEW_EVENT_ID)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let timestamp = headers
        .get(REVIEW_EVENT_TIMESTAMP)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let signature = headers
        .get(REVIEW_EVENT_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    Ok((id, timestamp, signature))
}

impl<S> FromRequest<S> for VerifiedBody
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request(req: Request, _: &S) -> Result<Self, Self::Rejection> {
        req.extensions()
            .get::<VerifiedBody>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod test {
    use http::HeaderValue;

    use super::*;

    fn signed_headers(key: &Key, id: &str, ts: &str, body: &Bytes) -> HeaderMap {
        let tag = hmac::sign(key, &rebuild_message(id, ts, body));
        let signature = format!("{}{}", HMAC_PREFIX, hex::encode(tag));

        let mut headers = HeaderMap::new();
        headers.insert(REVIEW_EVENT_ID, HeaderValue::from_str(id).unwrap());
        headers.insert(REVIEW_EVENT_TIMESTAMP, HeaderValue::from_str(ts).unwrap());
        headers.insert(
            REVIEW_EVENT_SIGNATURE,
            HeaderValue::from_str(&signature).unwrap(),
        );

        headers
    }

    #[test]
    fn test_accepts_valid_signature() {
        let key = Key::new(hmac::HMAC_SHA256, b"secret");
        let body = Bytes::from_static(b"{\"user_id\":\"u1\"}");
        let headers = signed_headers(&key, "evt-1", "2026-03-01T10:00:00Z", &body);

        assert!(verify_signature(&key, &headers, &body).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body() {
        let key = Key::new(hmac::HMAC_SHA256, b"secret");
        let body = Bytes::from_static(b"{\"user_id\":\"u1\"}");
        let headers = signed_headers(&key, "evt-1", "2026-03-01T10:00:00Z", &body);

        let tampered = Bytes::from_static(b"{\"user_id\":\"mallory\"}");
        assert_eq!(
            verify_signature(&key, &headers, &tampered),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn test_rejects_wrong_key() {
        let key = Key::new(hmac::HMAC_SHA256, b"secret");
        let other = Key::new(hmac::HMAC_SHA256, b"not-the-secret");
        let body = Bytes::from_static(b"{}");
        let headers = signed_headers(&other, "evt-1", "2026-03-01T10:00:00Z", &body);

        assert_eq!(
            verify_signature(&key, &headers, &body),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn test_rejects_missing_headers() {
        let key = Key::new(hmac::HMAC_SHA256, b"secret");
        let body = Bytes::from_static(b"{}");

        assert_eq!(
            verify_signature(&key, &HeaderMap::new(), &body),
            Err(StatusCode::BAD_REQUEST)
        );
    }
}
