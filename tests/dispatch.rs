//! Request dispatch through the public router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};

use engarde::HttpServer;

mod common;

use common::{assert_status, body_json, body_text, catalog_setups, request, send};

const CONFIG: &str = r#"
[domain]
hosted_apps = ["shop", "blog"]
default_app = "shop"

[[applications]]
name = "shop"
locales = ["en-US", "pt-BR"]
default_locale = "en-US"

[[applications]]
name = "blog"
start_route = "/posts"
"#;

fn server() -> (tempfile::TempDir, HttpServer) {
    let (dir, config) = common::load(CONFIG);
    let server = HttpServer::new(config, catalog_setups("shop")).unwrap();
    (dir, server)
}

#[tokio::test]
async fn omitted_application_falls_back_to_default() {
    let (_dir, server) = server();
    let response = send(
        &server.router(),
        request("GET", "/items")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_status(&response, StatusCode::OK);
    assert_eq!(response.headers()["x-audited"], "yes");
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body = body_json(response).await;
    assert_eq!(body["items"][0], "lamp");
}

#[tokio::test]
async fn application_name_case_is_canonicalized() {
    let (_dir, server) = server();
    let response = send(
        &server.router(),
        request("GET", "/SHOP/items?page=2").body(Body::empty()).unwrap(),
    )
    .await;

    assert_status(&response, StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/shop/items?page=2");
}

#[tokio::test]
async fn bare_application_redirects_to_start_route() {
    let (_dir, server) = server();
    let response = send(&server.router(), request("GET", "/blog").body(Body::empty()).unwrap()).await;

    assert_status(&response, StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/blog/posts");
}

#[tokio::test]
async fn aliases_and_params_resolve() {
    let (_dir, server) = server();
    let router = server.router();

    let alias = send(
        &router,
        request("GET", "/shop/products")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_status(&alias, StatusCode::OK);

    let item = send(
        &router,
        request("GET", "/shop/items/42")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body_json(item).await["id"], "42");
}

#[tokio::test]
async fn locale_follows_accept_language_unless_forced() {
    let (_dir, server) = server();
    let router = server.router();

    let negotiated = send(
        &router,
        request("GET", "/shop/items")
            .header(header::ACCEPT, "application/json")
            .header(header::ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9,en;q=0.5")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(negotiated.headers()[header::CONTENT_LANGUAGE], "pt-BR");

    let forced = send(
        &router,
        request("GET", "/shop/items?_locale=en-US")
            .header(header::ACCEPT, "application/json")
            .header(header::ACCEPT_LANGUAGE, "pt-BR")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(forced.headers()[header::CONTENT_LANGUAGE], "en-US");
    assert_eq!(body_json(forced).await["locale"], "en-US");
}

#[tokio::test]
async fn text_mime_can_be_forced() {
    let (_dir, server) = server();
    let response = send(
        &server.router(),
        request("GET", "/shop?_mime=txt").body(Body::empty()).unwrap(),
    )
    .await;

    assert_status(&response, StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_text(response).await, "catalog home");
}

#[tokio::test]
async fn head_request_has_no_body() {
    let (_dir, server) = server();
    let response = send(
        &server.router(),
        request("HEAD", "/shop/items")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_status(&response, StatusCode::OK);
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn errors_carry_json_bodies() {
    let (_dir, server) = server();
    let router = server.router();

    let missing = send(&router, request("GET", "/shop/nowhere").body(Body::empty()).unwrap()).await;
    assert_status(&missing, StatusCode::NOT_FOUND);
    assert_eq!(body_json(missing).await["error"]["code"], "ROUTE_NOT_FOUND");

    let wrong_method = send(&router, request("DELETE", "/shop/items").body(Body::empty()).unwrap()).await;
    assert_status(&wrong_method, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong_method.headers()[header::ALLOW], "GET, HEAD, POST");
    assert_eq!(body_json(wrong_method).await["error"]["code"], "METHOD_NOT_ALLOWED");

    let unacceptable = send(
        &router,
        request("GET", "/shop/items?_mime=xml").body(Body::empty()).unwrap(),
    )
    .await;
    assert_status(&unacceptable, StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn form_body_reaches_the_action() {
    let (_dir, server) = server();
    let response = send(
        &server.router(),
        request("POST", "/shop/items")
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=chair"))
            .unwrap(),
    )
    .await;

    assert_status(&response, StatusCode::CREATED);
    assert_eq!(body_json(response).await["created"], "chair");
}

#[tokio::test]
async fn reload_keeps_unchanged_applications() {
    let (dir, server) = server();
    let before = server.state().load();
    let blog_before = Arc::clone(before.application("blog").unwrap());
    let shop_before = Arc::clone(before.application("shop").unwrap());

    let changed = CONFIG.replace(r#"locales = ["en-US", "pt-BR"]"#, r#"locales = ["en-US", "fr-FR"]"#);
    let path = dir.path().join("engarde.toml");
    std::fs::write(&path, changed).unwrap();
    let config = engarde::config::load_config(&path).unwrap();
    server.state().apply_config(config).unwrap();

    let after = server.state().load();
    assert!(Arc::ptr_eq(&blog_before, after.application("blog").unwrap()));
    assert!(!Arc::ptr_eq(&shop_before, after.application("shop").unwrap()));

    let response = send(
        &server.router(),
        request("GET", "/shop/items")
            .header(header::ACCEPT, "application/json")
            .header(header::ACCEPT_LANGUAGE, "fr-FR")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.headers()[header::CONTENT_LANGUAGE], "fr-FR");
}

#[tokio::test]
async fn domain_time_out_bounds_request_time() {
    let (_dir, config) = common::load(&CONFIG.replace(
        "default_app = \"shop\"",
        "default_app = \"shop\"\ntime_out = 1",
    ));
    assert_eq!(config.domain.time_out, 1);
    let server = HttpServer::new(config, catalog_setups("shop")).unwrap();

    let response = send(
        &server.router(),
        request("GET", "/slow").body(Body::empty()).unwrap(),
    )
    .await;
    assert_status(&response, StatusCode::REQUEST_TIMEOUT);
}
