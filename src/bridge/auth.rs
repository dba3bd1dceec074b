//! Authentication middleware for the shell bridge.
//!
//! When the bridge config carries a bearer token, every request except CORS
//! preflights must present it in the `Authorization` header.

use crate::bridge::actix_error::ApiError;
use crate::config::BridgeConfig;
use crate::error::Error;

use actix_web::{
    Error as ActixError,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header,
};
use futures::future::{LocalBoxFuture, Ready, ready};
use std::sync::Arc;

/// Authentication middleware factory
pub struct Authentication {
    config: Arc<BridgeConfig>,
}

impl Authentication {
    /// Create a new Authentication middleware
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self { config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = AuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service,
            config: self.config.clone(),
        }))
    }
}

/// Authentication middleware implementation
pub struct AuthenticationMiddleware<S> {
    service: S,
    config: Arc<BridgeConfig>,
}

impl<S> AuthenticationMiddleware<S> {
    fn expected_token(&self) -> Option<&str> {
        self.config
            .authenticate
            .as_ref()
            .and_then(|auth| auth.bearer.as_ref())
            .map(|bearer| bearer.token.as_str())
    }
}

/// Whether the request carries `Authorization: Bearer <expected>`.
fn has_bearer_token(req: &ServiceRequest, expected: &str) -> bool {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // CORS preflight never carries credentials.
        let allowed = req.method() == actix_web::http::Method::OPTIONS
            || self
                .expected_token()
                .is_none_or(|expected| has_bearer_token(&req, expected));

        if allowed {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res)
            });
        }

        tracing::warn!(path = %req.path(), "Authentication failed: invalid or missing bearer token");
        Box::pin(async move {
            Err(ApiError::from(Error::Unauthorized(
                "Invalid or missing bearer token".to_string(),
            ))
            .into())
        })
    }
}
