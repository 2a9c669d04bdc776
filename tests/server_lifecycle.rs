//! The server over a real socket: serving, hot reload and graceful shutdown.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use engarde::{HttpServer, Shutdown};

mod common;

use common::catalog_setups;

const CONFIG: &str = r#"
[domain]
hosted_apps = ["shop"]

[[applications]]
name = "shop"
locales = ["en-US"]
default_locale = "en-US"
"#;

#[tokio::test]
async fn serves_reloads_and_stops() {
    let (dir, config) = common::load(CONFIG);
    let server = HttpServer::new(config, catalog_setups("shop")).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let state = server.state().clone();
    let task = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    let res = client
        .get(format!("http://{addr}/shop/items"))
        .header("accept", "application/json")
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-language"], "en-US");

    let path = dir.path().join("engarde.toml");
    std::fs::write(&path, CONFIG.replace("en-US", "de-DE")).unwrap();
    let reloaded = engarde::config::load_config(&path).unwrap();
    updates_tx.send(reloaded).unwrap();

    let mut applied = false;
    for _ in 0..50 {
        let locales = state.load().application("shop").unwrap().config().locales.clone();
        if locales == vec!["de-DE".to_string()] {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(applied, "reload was not applied");

    let res = client
        .get(format!("http://{addr}/shop/items"))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["content-language"], "de-DE");

    shutdown.trigger();
    let stopped = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}
