use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};

use crate::config::JwtAuthConfig;
use crate::pipeline::JwtAuth;
use crate::policy::Decision;

/// Tower layer that authenticates every request before it reaches the inner
/// service.
#[derive(Clone)]
pub struct JwtAuthLayer {
    auth: JwtAuth,
}

impl JwtAuthLayer {
    pub fn new(config: JwtAuthConfig) -> Self {
        Self::from_auth(JwtAuth::new(config))
    }

    pub fn from_auth(auth: JwtAuth) -> Self {
        Self { auth }
    }
}

impl<S> Layer<S> for JwtAuthLayer {
    type Service = JwtAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthService {
            inner,
            auth: self.auth.clone(),
        }
    }
}

#[derive(Clone)]
pub struct JwtAuthService<S> {
    inner: S,
    auth: JwtAuth,
}

impl<S> Service<Request> for JwtAuthService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Call the service that was polled ready and leave the clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let auth = self.auth.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let outcome = match auth.authenticate(&parts).await {
                Ok(outcome) => outcome,
                Err(abort) => return Ok(abort.into_response()),
            };

            match auth.policy().decide(outcome, &mut parts.extensions) {
                Decision::Continue => inner.call(http::Request::from_parts(parts, body)).await,
                Decision::Reject(response) => Ok(response),
            }
        })
    }
}
