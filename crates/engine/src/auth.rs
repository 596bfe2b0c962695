//! Per-request JWT minting as a tower layer.
//!
//! Unlike a static bearer token, the Engine API expects the `iat` claim of
//! every request to sit within sixty seconds of the server clock, and the
//! drift scenarios need to push it just outside that window. The layer mints
//! a token per request from a shared drift cell the test can set at any time.

use alloy_rpc_types_engine::{Claims, JwtSecret};
use http::header::{AUTHORIZATION, HeaderValue};
use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    task::{Context, Poll},
    time::{SystemTime, UNIX_EPOCH},
};
use tower::{Layer, Service};

/// Tower layer inserting `Authorization: Bearer <fresh token>` into every
/// outgoing request.
#[derive(Debug, Clone)]
pub struct JwtAuthLayer {
    secret: JwtSecret,
    drift: Arc<AtomicI64>,
}

impl JwtAuthLayer {
    /// A layer minting undrifted tokens from `secret`.
    pub fn new(secret: JwtSecret) -> Self {
        Self { secret, drift: Arc::new(AtomicI64::new(0)) }
    }

    /// Handle through which tests adjust the `iat` drift, in seconds.
    pub fn drift_handle(&self) -> Arc<AtomicI64> {
        self.drift.clone()
    }
}

impl<S> Layer<S> for JwtAuthLayer {
    type Service = JwtAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthService { inner, secret: self.secret, drift: self.drift.clone() }
    }
}

/// Service produced by [`JwtAuthLayer`].
#[derive(Debug, Clone)]
pub struct JwtAuthService<S> {
    inner: S,
    secret: JwtSecret,
    drift: Arc<AtomicI64>,
}

impl<S, B> Service<http::Request<B>> for JwtAuthService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let iat = now.saturating_add(self.drift.load(Ordering::Relaxed)).max(0) as u64;
        let claims = Claims { iat, exp: None };
        if let Ok(token) = self.secret.encode(&claims) {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }
        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::globals::DEFAULT_JWT_SECRET;

    #[test]
    fn drift_handle_is_shared_with_clones() {
        let layer = JwtAuthLayer::new(
            JwtSecret::from_hex(alloy_primitives::hex::encode(DEFAULT_JWT_SECRET)).unwrap(),
        );
        let handle = layer.drift_handle();
        let cloned = layer.clone();
        handle.store(61, Ordering::Relaxed);
        assert_eq!(cloned.drift_handle().load(Ordering::Relaxed), 61);
    }

    #[test]
    fn tokens_validate_against_the_secret() {
        let secret =
            JwtSecret::from_hex(alloy_primitives::hex::encode(DEFAULT_JWT_SECRET)).unwrap();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let token = secret.encode(&Claims { iat: now, exp: None }).expect("encodes");
        assert!(secret.validate(&token).is_ok());
    }
}
