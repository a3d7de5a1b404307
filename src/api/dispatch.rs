//! Version-aware dispatch of bound operations.
//!
//! An [`Endpoint`] maps `(method, api version)` to an [`Operation`]. The
//! table is built once when the router is constructed; each request picks
//! its variant from `X-Api-Version`, gets bound, and has its body decoded
//! before the handler runs.

use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, MethodRouter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::binder::{bind, AuthDeclaration, RequestAuth};
use super::headers::api_version;
use super::response::{ApiError, Success};
use crate::error::AuthError;
use crate::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, AuthError>> + Send>>;

type Handler = Arc<dyn Fn(Arc<AppState>, RequestAuth, Bytes) -> HandlerFuture + Send + Sync>;

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, AuthError> {
    serde_json::to_value(value).map_err(|e| AuthError::internal(format!("response encoding: {e}")))
}

fn decode_body<B: DeserializeOwned>(body: &Bytes) -> Result<B, AuthError> {
    let raw: &[u8] = if body.is_empty() { b"{}" } else { body };
    serde_json::from_slice(raw).map_err(|e| AuthError::bad_request(format!("malformed body: {e}")))
}

/// A handler together with what it needs bound.
#[derive(Clone)]
pub struct Operation {
    declaration: AuthDeclaration,
    handler: Handler,
}

impl Operation {
    pub fn new<F, Fut, T>(declaration: AuthDeclaration, f: F) -> Self
    where
        F: Fn(Arc<AppState>, RequestAuth) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
        T: Serialize + 'static,
    {
        let handler: Handler = Arc::new(move |state, auth, _body| -> HandlerFuture {
            let fut = f(state, auth);
            Box::pin(async move { to_value(fut.await?) })
        });
        Self {
            declaration,
            handler,
        }
    }

    /// Like [`Operation::new`], with the JSON body decoded into `B`. An empty
    /// body decodes as `{}`.
    pub fn with_body<B, F, Fut, T>(declaration: AuthDeclaration, f: F) -> Self
    where
        B: DeserializeOwned + Send + 'static,
        F: Fn(Arc<AppState>, RequestAuth, B) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
        T: Serialize + 'static,
    {
        let handler: Handler = Arc::new(move |state, auth, body| -> HandlerFuture {
            match decode_body::<B>(&body) {
                Ok(decoded) => {
                    let fut = f(state, auth, decoded);
                    Box::pin(async move { to_value(fut.await?) })
                }
                Err(e) => Box::pin(async move { Err(e) }),
            }
        });
        Self {
            declaration,
            handler,
        }
    }
}

#[derive(Clone, Default)]
pub struct Endpoint {
    operations: HashMap<(Method, u32), Operation>,
}

impl Endpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the version 1 variant for `method`.
    pub fn on(self, method: Method, operation: Operation) -> Self {
        self.on_version(method, 1, operation)
    }

    pub fn on_version(mut self, method: Method, version: u32, operation: Operation) -> Self {
        self.operations.insert((method, version), operation);
        self
    }

    pub fn into_route(self) -> MethodRouter<Arc<AppState>> {
        let endpoint = Arc::new(self);
        any(move |State(state): State<Arc<AppState>>, request: Request| {
            let endpoint = Arc::clone(&endpoint);
            async move { endpoint.dispatch(state, request).await }
        })
    }

    pub async fn dispatch(&self, state: Arc<AppState>, request: Request) -> Response {
        let (mut parts, body) = request.into_parts();
        let version = api_version(&parts.headers);
        let span = tracing::info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %parts.method,
            path = %parts.uri.path(),
            version,
        );

        async move {
            match self.run(&state, &mut parts, body, version).await {
                Ok(data) => Success::ok(data).into_response(),
                Err(e) => {
                    if e.code() >= 50000 {
                        tracing::warn!(error = %e, "Request failed");
                    } else {
                        tracing::debug!(error = %e, "Request rejected");
                    }
                    ApiError::from_auth(&e, state.config.dev_mode).into_response()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        state: &Arc<AppState>,
        parts: &mut Parts,
        body: Body,
        version: u32,
    ) -> Result<serde_json::Value, AuthError> {
        let operation = self
            .operations
            .get(&(parts.method.clone(), version))
            .ok_or_else(|| AuthError::not_found("unsupported API version"))?;

        let params = Path::<HashMap<String, String>>::from_request_parts(parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();

        let auth = bind(state, &operation.declaration, parts, &params).await?;

        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AuthError::bad_request(format!("unreadable body: {e}")))?;

        (operation.handler)(Arc::clone(state), auth, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{setup_db, test_state};
    use axum::http::StatusCode;
    use axum::Router;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    fn router(state: Arc<AppState>) -> Router {
        let endpoint = Endpoint::new()
            .on(
                Method::GET,
                Operation::new(AuthDeclaration::public().resource_id(), |_state, auth| async move {
                    Ok::<_, AuthError>(json!({ "v": 1, "id": auth.resource_id }))
                }),
            )
            .on_version(
                Method::GET,
                2,
                Operation::new(AuthDeclaration::public(), |_state, _auth| async move {
                    Ok::<_, AuthError>(json!({ "v": 2 }))
                }),
            )
            .on(
                Method::POST,
                Operation::with_body(AuthDeclaration::public(), |_state, _auth, body: Greeting| async move {
                    Ok::<_, AuthError>(format!("hello {}", body.name))
                }),
            );
        Router::new()
            .route("/things/:id", endpoint.into_route())
            .with_state(state)
    }

    async fn send(router: Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str, version: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(v) = version {
            builder = builder.header("x-api-version", v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_version_selects_variant() {
        let (db, _temp) = setup_db();
        let app = router(test_state(db));

        let (status, body) = send(app.clone(), get("/things/7", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errcode"], 20000);
        assert_eq!(body["data"], json!({ "v": 1, "id": 7 }));

        let (_, body) = send(app.clone(), get("/things/7", Some("2"))).await;
        assert_eq!(body["data"]["v"], 2);

        // Out-of-range versions fall back to v1.
        let (_, body) = send(app, get("/things/7", Some("250"))).await;
        assert_eq!(body["data"]["v"], 1);
    }

    #[tokio::test]
    async fn test_missing_variant_is_not_found() {
        let (db, _temp) = setup_db();
        let app = router(test_state(db));

        let (status, body) = send(app.clone(), get("/things/7", Some("3"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errcode"], 40400);
        assert!(body["errmsg"].as_str().unwrap().contains("unsupported API version"));

        let request = axum::http::Request::builder()
            .method(Method::DELETE)
            .uri("/things/7")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_zero_resource_id_is_not_found() {
        let (db, _temp) = setup_db();
        let (status, body) = send(router(test_state(db)), get("/things/0", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errcode"], 40400);
    }

    #[tokio::test]
    async fn test_body_decoding() {
        let (db, _temp) = setup_db();
        let app = router(test_state(db));
        let post = |body: &'static str| {
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/things/1")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let (status, body) = send(app.clone(), post(r#"{"name":"li"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "hello li");

        let (status, body) = send(app, post("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errcode"], 40000);
    }
}
