use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router};
use common_jwt_auth::{
    provider_fn, resolver_fn, AuthContext, AuthError, BoxError, DenyList, JwtAuthConfig,
    JwtAuthLayer, ProvidedSecrets, RequestState, ResolverAbort, SecretSpec,
};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

fn sign(claims: Value, secret: &str) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("sign token")
}

async fn me(auth: AuthContext) -> Json<Value> {
    Json(auth.claims.into_value())
}

async fn optional(auth: Option<AuthContext>) -> &'static str {
    if auth.is_some() {
        "authenticated"
    } else {
        "anonymous"
    }
}

async fn state(Extension(state): Extension<RequestState>) -> Json<Value> {
    Json(json!({
        "user": state.get("user"),
        "jwtdata": state.get("jwtdata"),
        "token": state.get("token"),
        "error": state.auth_error().map(AuthError::label),
    }))
}

fn app(config: JwtAuthConfig) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/optional", get(optional))
        .route("/state", get(state))
        .layer(JwtAuthLayer::new(config))
}

fn request(uri: &str, headers: &[(axum::http::HeaderName, &str)]) -> Request {
    let mut builder = axum::http::Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(name, *value);
    }
    builder.body(Body::empty()).expect("request")
}

async fn send(app: Router, request: Request) -> (StatusCode, Response) {
    let response = app.oneshot(request).await.expect("infallible");
    (response.status(), response)
}

async fn text(response: Response) -> String {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

async fn json_body(response: Response) -> Value {
    serde_json::from_str(&text(response).await).expect("json")
}

#[tokio::test]
async fn missing_token_is_rejected() {
    let (status, response) = send(app(JwtAuthConfig::new().with_secret("shhhh")), request("/me", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-error-code"], "AUTH_HEADER");
    assert_eq!(text(response).await, "No authentication token found\n");
}

#[tokio::test]
async fn malformed_header_is_rejected() {
    let (status, response) = send(
        app(JwtAuthConfig::new().with_secret("shhhh")),
        request("/me", &[(AUTHORIZATION, "wrong")]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        text(response).await,
        "Bad Authorization header format. Format is \"Authorization: Bearer <token>\"\n"
    );
}

#[tokio::test]
async fn rotated_secret_still_verifies() {
    let token = sign(json!({ "foo": "bar" }), "s2");
    let (status, response) = send(
        app(JwtAuthConfig::new().with_secret(["s1", "s2"])),
        request("/me", &[(AUTHORIZATION, &format!("Bearer {token}"))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "foo": "bar" }));
}

#[tokio::test]
async fn wrong_secret_hides_detail_unless_debug() {
    let token = sign(json!({ "foo": "bar" }), "other");
    let header = format!("Bearer {token}");

    let (status, response) = send(
        app(JwtAuthConfig::new().with_secret("shhhh")),
        request("/me", &[(AUTHORIZATION, &header)]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(text(response).await, "Invalid token\n");

    let (status, response) = send(
        app(JwtAuthConfig::new().with_secret("shhhh").with_debug(true)),
        request("/me", &[(AUTHORIZATION, &header)]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(text(response).await, "Invalid token - invalid signature\n");
}

#[tokio::test]
async fn expired_token_reports_expiry_in_debug() {
    let token = sign(json!({ "foo": "bar", "exp": 1_382_412_921 }), "shhhh");
    let (status, response) = send(
        app(JwtAuthConfig::new().with_secret("shhhh").with_debug(true)),
        request("/me", &[(AUTHORIZATION, &format!("Bearer {token}"))]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(text(response).await, "Invalid token - jwt expired\n");
}

#[tokio::test]
async fn provider_failure_across_all_candidates() {
    let config = JwtAuthConfig::new().with_debug(true).with_secret(SecretSpec::provider(
        provider_fn(|_token| async { Ok::<_, BoxError>(ProvidedSecrets::from(["bad1", "bad2"])) }),
    ));
    let token = sign(json!({ "foo": "bar" }), "good");
    let (status, response) = send(
        app(config),
        request("/me", &[(AUTHORIZATION, &format!("Bearer {token}"))]),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error = response.extensions().get::<AuthError>().cloned().expect("error attached");
    assert_eq!(error.candidate(), Some(0));
    assert_eq!(text(response).await, "Invalid token - invalid signature\n");
}

#[tokio::test]
async fn provider_error_is_a_secret_failure() {
    let config = JwtAuthConfig::new().with_debug(true).with_secret(SecretSpec::provider(
        provider_fn(|_token| async { Err::<ProvidedSecrets, BoxError>("key service offline".into()) }),
    ));
    let token = sign(json!({ "foo": "bar" }), "good");
    let (status, response) = send(
        app(config),
        request("/me", &[(AUTHORIZATION, &format!("Bearer {token}"))]),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(response).await, "Invalid secret - Key service offline\n");
}

#[tokio::test]
async fn revoked_token_is_rejected() {
    let deny = DenyList::new();
    deny.revoke("revoked-id");
    let config = JwtAuthConfig::new().with_secret("shhhh").with_is_revoked(deny.clone());

    let revoked = sign(json!({ "foo": "bar", "jti": "revoked-id" }), "shhhh");
    let (status, response) = send(
        app(config.clone()),
        request("/me", &[(AUTHORIZATION, &format!("Bearer {revoked}"))]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-error-code"], "AUTH_REVOKED");
    assert_eq!(text(response).await, "Token revoked\n");

    let fine = sign(json!({ "foo": "bar", "jti": "other-id" }), "shhhh");
    let (status, _) = send(
        app(config),
        request("/me", &[(AUTHORIZATION, &format!("Bearer {fine}"))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cookie_takes_precedence_over_header() {
    let token = sign(json!({ "foo": "cookie" }), "shhhh");
    let cookie = format!("jwt={token}");
    let (status, response) = send(
        app(JwtAuthConfig::new().with_secret("shhhh").with_cookie("jwt")),
        request("/me", &[(COOKIE, &cookie), (AUTHORIZATION, "Bearer not-even-a-jwt")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "foo": "cookie" }));
}

#[tokio::test]
async fn custom_resolver_abort_passes_through_untouched() {
    let config = JwtAuthConfig::new()
        .with_secret("shhhh")
        .with_passthrough(true)
        .with_get_token(resolver_fn(|_parts, _config| {
            Err(ResolverAbort::new(StatusCode::UNAUTHORIZED, "Bad Authorization\n").into())
        }));
    let (status, response) = send(app(config), request("/optional", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("x-error-code").is_none());
    assert_eq!(text(response).await, "Bad Authorization\n");
}

#[tokio::test]
async fn custom_resolver_supplies_token() {
    let token = sign(json!({ "foo": "query" }), "shhhh");
    let config = JwtAuthConfig::new()
        .with_secret("shhhh")
        .with_get_token(resolver_fn(|parts, _config| {
            Ok(parts
                .uri
                .query()
                .and_then(|query| query.strip_prefix("token="))
                .map(str::to_owned))
        }));
    let (status, response) = send(app(config), request(&format!("/me?token={token}"), &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "foo": "query" }));
}

#[tokio::test]
async fn passthrough_continues_and_records_error() {
    let config = JwtAuthConfig::new().with_secret("shhhh").with_passthrough(true);
    let token = sign(json!({ "foo": "bar" }), "other");
    let header = format!("Bearer {token}");

    let (status, response) = send(
        app(config.clone()),
        request("/optional", &[(AUTHORIZATION, &header)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(response).await, "anonymous");

    let (status, response) = send(app(config), request("/state", &[(AUTHORIZATION, &header)])).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid token");
    assert_eq!(body["user"], Value::Null);
}

#[tokio::test]
async fn passthrough_treats_malformed_header_as_missing() {
    let config = JwtAuthConfig::new().with_secret("shhhh").with_passthrough(true);
    let (status, response) = send(app(config), request("/state", &[(AUTHORIZATION, "wrong")])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(response).await["error"], "No authentication token found");
}

#[tokio::test]
async fn missing_secret_is_a_server_error_unless_passthrough() {
    let token = sign(json!({ "foo": "bar" }), "shhhh");
    let header = format!("Bearer {token}");

    let (status, response) = send(app(JwtAuthConfig::new()), request("/me", &[(AUTHORIZATION, &header)])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(response).await, "Invalid secret\n");

    let (status, response) = send(
        app(JwtAuthConfig::new().with_passthrough(true)),
        request("/optional", &[(AUTHORIZATION, &header)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(response).await, "anonymous");
}

#[tokio::test]
async fn upstream_secret_is_used_for_this_request() {
    async fn inject_secret(mut request: Request, next: Next) -> Response {
        request
            .extensions_mut()
            .insert(RequestState::new().with_secret("per-request"));
        next.run(request).await
    }

    let app = app(JwtAuthConfig::new()).layer(middleware::from_fn(inject_secret));
    let token = sign(json!({ "foo": "bar" }), "per-request");
    let (status, response) = send(app, request("/me", &[(AUTHORIZATION, &format!("Bearer {token}"))])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "foo": "bar" }));
}

#[tokio::test]
async fn claims_and_token_land_under_configured_keys() {
    let token = sign(json!({ "foo": "bar" }), "shhhh");
    let config = JwtAuthConfig::new()
        .with_secret("shhhh")
        .with_key("jwtdata")
        .with_token_key("token");
    let (status, response) = send(
        app(config),
        request("/state", &[(AUTHORIZATION, &format!("Bearer {token}"))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["jwtdata"], json!({ "foo": "bar" }));
    assert_eq!(body["token"], json!(token));
    assert_eq!(body["user"], Value::Null);
    assert_eq!(body["error"], Value::Null);
}
