use crate::config::{AppConfig, AuthConfig};
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
};
use tracing::warn;

const PUBLIC_PATHS: &[&str] = &["/health"];

/// Bearer-token check against `auth.api_keys`.
///
/// The `/changes` event stream is usually opened by a browser `EventSource`,
/// which cannot set headers, so an `api_key` query parameter is accepted too.
/// With no keys configured every request is refused unless
/// `auth.allow_anonymous` is set.
pub struct ApiKeyAuth;

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: Rc<S>,
}

fn presented_key(authorization: Option<&str>, query: &str) -> Option<String> {
    if let Some(header) = authorization {
        return header.strip_prefix("Bearer ").map(str::to_string);
    }
    qstring::QString::from(query).get("api_key").map(str::to_string)
}

pub(crate) fn is_authorized(authorization: Option<&str>, query: &str, auth: &AuthConfig) -> bool {
    if auth.api_keys.is_empty() {
        return auth.allow_anonymous;
    }
    presented_key(authorization, query)
        .is_some_and(|presented| auth.api_keys.iter().any(|k| *k == presented))
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        if req.method() == Method::OPTIONS || PUBLIC_PATHS.contains(&req.path()) {
            return Box::pin(async move { srv.call(req).await });
        }

        let config = match req.app_data::<actix_web::web::Data<AppConfig>>() {
            Some(c) => c,
            None => {
                warn!("AppConfig missing in app_data");
                return Box::pin(async move {
                    Err(actix_web::error::ErrorInternalServerError("Configuration error"))
                });
            }
        };

        let authorization = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok());

        if !is_authorized(authorization, req.query_string(), &config.auth) {
            warn!("Rejected unauthenticated request to {}", req.path());
            return Box::pin(async move {
                Err(actix_web::error::ErrorUnauthorized("Invalid or missing API key"))
            });
        }

        Box::pin(async move { srv.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> AuthConfig {
        AuthConfig {
            api_keys: vec!["k-123".to_string()],
            allow_anonymous: false,
        }
    }

    #[test]
    fn bearer_header_must_match() {
        assert!(is_authorized(Some("Bearer k-123"), "", &keys()));
        assert!(!is_authorized(Some("Bearer nope"), "", &keys()));
        assert!(!is_authorized(Some("k-123"), "", &keys()));
    }

    #[test]
    fn query_key_is_fallback_only() {
        assert!(is_authorized(None, "api_key=k-123", &keys()));
        assert!(!is_authorized(None, "", &keys()));
        assert!(!is_authorized(Some("Basic abc"), "api_key=k-123", &keys()));
    }

    #[test]
    fn no_configured_keys_refuses_everything() {
        let unset = AuthConfig::default();
        assert!(!is_authorized(None, "", &unset));
        assert!(!is_authorized(Some("Bearer "), "api_key=", &unset));
    }

    #[test]
    fn anonymous_access_needs_explicit_opt_in() {
        let open = AuthConfig {
            api_keys: Vec::new(),
            allow_anonymous: true,
        };
        assert!(is_authorized(None, "", &open));

        // Configured keys win over the opt-in
        let both = AuthConfig {
            allow_anonymous: true,
            ..keys()
        };
        assert!(!is_authorized(None, "", &both));
    }
}
