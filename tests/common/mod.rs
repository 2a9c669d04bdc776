//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use engarde::config::load_config;
use engarde::engine::{ActionContext, ApplicationBuilder, Next};
use engarde::http::ActionResult;
use engarde::routing::{MimeSpec, RouteValues};
use engarde::{Controller, EngardeConfig, EngineError, RouteMiddleware, SetupRegistry};
use engarde::ApplicationSetup;

pub const PEER: &str = "192.0.2.10:50100";

/// Write `toml` into a fresh directory and load it from there.
pub fn load(toml: &str) -> (TempDir, EngardeConfig) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engarde.toml");
    std::fs::write(&path, toml).unwrap();
    let config = load_config(&path).unwrap();
    (dir, config)
}

pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "engarde.test")
        .header(header::USER_AGENT, "integration-tests")
}

/// Drive `router` once, as if the request came from [`PEER`].
pub async fn send(router: &Router, mut request: Request<Body>) -> Response {
    let peer: SocketAddr = PEER.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` of the first `Set-Cookie` header setting `name`.
pub fn cookie_pair(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status, "headers: {:?}", response.headers());
}

/// A small catalog controller used by the tests.
pub struct CatalogController;

fn declare(text: &str, secure: bool) -> RouteValues {
    let mut values: RouteValues = text.parse().unwrap();
    values.accept_mimes = Some(vec![
        MimeSpec::from("json"),
        MimeSpec::from("html"),
        MimeSpec::from("txt"),
    ]);
    values.is_secure = Some(secure);
    values
}

#[async_trait]
impl Controller for CatalogController {
    fn name(&self) -> &str {
        "catalog"
    }

    fn defaults(&self) -> RouteValues {
        RouteValues {
            middlewares: Some(vec!["audit".to_string()]),
            ..RouteValues::default()
        }
    }

    fn routes(&self) -> Vec<RouteValues> {
        vec![
            declare("GET,HEAD / catalog:home", false),
            declare("GET,HEAD /items /products catalog:list", false),
            declare("GET /items/{id} catalog:show", false),
            declare("POST /items catalog:create", true),
            declare("GET /reports catalog:reports", true),
            declare("GET /slow catalog:slow", false),
        ]
    }

    async fn invoke(
        &self,
        action: &str,
        ctx: &mut ActionContext,
    ) -> Result<ActionResult, EngineError> {
        match action {
            "home" => Ok(ActionResult::text("catalog home")),
            "list" => Ok(ActionResult::json(json!({
                "items": ["lamp", "desk"],
                "locale": ctx.route.response_locale(),
            }))),
            "show" => Ok(ActionResult::json(json!({ "id": ctx.param("id") }))),
            "create" => {
                let data = ctx.request.posted_data();
                Ok(ActionResult::json(json!({ "created": data.get("name") }))
                    .with_status(StatusCode::CREATED))
            }
            "reports" => Ok(ActionResult::json(json!({ "reports": 3 }))),
            "slow" => {
                tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
                Ok(ActionResult::text("finally"))
            }
            other => Err(EngineError::UnknownAction {
                controller: "catalog".into(),
                action: other.into(),
            }),
        }
    }
}

/// Marks every response it wraps.
pub struct Audit;

#[async_trait]
impl RouteMiddleware for Audit {
    async fn handle(
        &self,
        ctx: &mut ActionContext,
        next: Next<'_>,
    ) -> Result<ActionResult, EngineError> {
        let result = next.run(ctx).await?;
        Ok(result.with_header("x-audited", "yes"))
    }
}

pub struct CatalogSetup;

impl ApplicationSetup for CatalogSetup {
    fn configure_application(&self, builder: ApplicationBuilder) -> ApplicationBuilder {
        builder.controller(CatalogController).middleware("audit", Audit)
    }
}

/// Setups with the catalog registered for `app`.
pub fn catalog_setups(app: &str) -> SetupRegistry {
    let mut setups = SetupRegistry::new();
    setups.insert(app.to_string(), Arc::new(CatalogSetup) as Arc<dyn ApplicationSetup>);
    setups
}
