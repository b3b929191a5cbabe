//! End-to-end dispatch tests against a running gateway.

use std::net::SocketAddr;

use api_gateway::config::GatewayConfig;
use serde_json::Value;

mod common;

const ROUTES: &str = r#"
    # Declared first, sorts last.
    [[routes]]
    id = 2
    order = 2
    name = "fallback"
    group = { id = 1 }
    cluster = { id = 1 }
    [[routes.plugins]]
    name = "StaticResponse"
    config = { status = 200, body = "fallback" }

    [[routes]]
    id = 1
    order = 1
    name = "users"
    predicates = ["Path=/users/{id}", "Method=GET"]
    group = { id = 1 }
    cluster = { id = 1 }
    [[routes.plugins]]
    name = "AddResponseHeader"
    config = { name = "X-User", value = "user-{id}" }
    [[routes.plugins]]
    name = "StaticResponse"
    config = { status = 200, body = "users" }

    [[routes]]
    id = 3
    order = 0
    predicates = ["Path=/old/**"]
    group = { id = 1 }
    cluster = { id = 1 }
    [[routes.plugins]]
    name = "RedirectTo"
    config = { status = 301, url = "https://example.com/new" }

    [[routes]]
    id = 4
    order = 0
    group = { id = 1 }
    cluster = { id = 1 }
    predicates = [
        "Path=/internal",
        { name = "XForwardedRemoteAddr", args = { maxTrustedIndex = 2, sources = ["2.2.2.0/24"] } },
    ]
    [[routes.plugins]]
    name = "StaticResponse"
    config = { status = 200, body = "internal" }
"#;

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.routes = common::routes(ROUTES);
    config
}

#[tokio::test]
async fn test_first_match_by_order() {
    let addr: SocketAddr = "127.0.0.1:28201".parse().unwrap();
    let gateway = common::start_gateway(addr, config()).await;
    let client = common::client();

    let res = client.get(gateway.url("/users/7")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-user"], "user-7");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "users");

    // Trailing slash matches by default.
    let res = client.get(gateway.url("/users/7/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "users");

    // Wrong method falls through to the catch-all.
    let res = client.post(gateway.url("/users/7")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "fallback");

    let res = client.get(gateway.url("/anything")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "fallback");
}

#[tokio::test]
async fn test_redirect_plugin() {
    let addr: SocketAddr = "127.0.0.1:28202".parse().unwrap();
    let gateway = common::start_gateway(addr, config()).await;

    let res = common::client()
        .get(gateway.url("/old/page/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(res.headers()["location"], "https://example.com/new");
}

#[tokio::test]
async fn test_not_found_message() {
    let addr: SocketAddr = "127.0.0.1:28203".parse().unwrap();
    let mut config = config();
    config.routes.retain(|r| r.id != 2);
    let gateway = common::start_gateway(addr, config).await;

    let res = common::client()
        .get(gateway.url("/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"httpCode": 200, "msg": "Api Not Found", "code": "404"})
    );
}

#[tokio::test]
async fn test_forwarded_address_predicate() {
    let addr: SocketAddr = "127.0.0.1:28204".parse().unwrap();
    let mut config = config();
    config.routes.retain(|r| r.id != 2);
    let gateway = common::start_gateway(addr, config).await;
    let client = common::client();

    let res = client
        .get(gateway.url("/internal"))
        .header("x-forwarded-for", "1.1.1.1, 2.2.2.2, 3.3.3.3")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "internal");

    // Without the header the socket peer (127.0.0.1) is used.
    let res = client.get(gateway.url("/internal")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "404");
}
