//! Route refresh through the admin API, the file watcher and the refresh handle.

use std::net::SocketAddr;
use std::time::Duration;

use api_gateway::config::GatewayConfig;
use serde_json::Value;

mod common;

fn static_route(id: i64, path: &str, body: &str) -> String {
    format!(
        r#"
[[routes]]
id = {id}
predicates = ["Path={path}"]
group = {{ id = 1 }}
cluster = {{ id = 1 }}
[[routes.plugins]]
name = "StaticResponse"
config = {{ body = "{body}" }}
"#
    )
}

#[tokio::test]
async fn test_admin_api_and_refresh() {
    let addr: SocketAddr = "127.0.0.1:28211".parse().unwrap();
    let admin = "http://127.0.0.1:28221";
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("routes.toml");
    common::write(&file, &static_route(1, "/v1", "one"));

    let mut config = GatewayConfig::default();
    config.route_files = vec![file.clone()];
    config.refresh.watch_route_files = false;
    config.admin.enabled = true;
    config.admin.api_key = "secret".into();
    config.admin.bind_address = "127.0.0.1:28221".into();

    let gateway = common::start_gateway(addr, config).await;
    let client = common::client();

    let res = client.get(format!("{}/admin/status", admin)).send().await.unwrap();
    assert_eq!(res.status(), 401);
    let res = client
        .get(format!("{}/admin/status", admin))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let status: Value = client
        .get(format!("{}/admin/status", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["routes"], 1);
    assert_eq!(status["refresh_seq"], 1);

    let routes: Value = client
        .get(format!("{}/admin/routes", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes[0]["identity"], "1_1_1");
    assert_eq!(routes[0]["plugins"][0]["identity"], "gateway.builtin.static-response");

    let plugins: Value = client
        .get(format!("{}/admin/plugins", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plugins["instances"][0], "gateway.builtin.static-response");

    let switches: Value = client
        .get(format!("{}/admin/switches", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(switches[0]["group"], "gateway.builtin.static-response");

    // Change the file and refresh explicitly.
    common::write(
        &file,
        &format!("{}{}", static_route(1, "/v1", "one"), static_route(2, "/v2", "two")),
    );
    let res: Value = client
        .post(format!("{}/admin/refresh", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(res["routes"], 2);

    let body = client.get(gateway.url("/v2")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "two");

    // A broken file keeps the previous table.
    common::write(&file, "routes = [");
    let res = client
        .post(format!("{}/admin/refresh", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body = client.get(gateway.url("/v2")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "two");
}

#[tokio::test]
async fn test_file_watcher_refreshes_routes() {
    let addr: SocketAddr = "127.0.0.1:28212".parse().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("routes.toml");
    common::write(&file, &static_route(1, "/watched", "before"));

    let mut config = GatewayConfig::default();
    config.route_files = vec![file.clone()];
    config.refresh.watch_route_files = true;
    config.refresh.poll_interval_secs = 1;

    let gateway = common::start_gateway(addr, config).await;
    let client = common::client();
    let url = gateway.url("/watched");

    let body = client.get(&url).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "before");

    common::write(&file, &static_route(1, "/watched", "after"));
    let refreshed = common::eventually(Duration::from_secs(10), || {
        let client = client.clone();
        let url = url.clone();
        async move {
            match client.get(&url).send().await {
                Ok(res) => res.text().await.map(|b| b == "after").unwrap_or(false),
                Err(_) => false,
            }
        }
    })
    .await;
    assert!(refreshed, "watcher did not refresh routes");
}

#[tokio::test]
async fn test_requests_during_refresh_see_whole_tables() {
    let addr: SocketAddr = "127.0.0.1:28213".parse().unwrap();
    let mut config = GatewayConfig::default();
    config.routes = common::routes(&static_route(1, "/gen", "v0"));
    let gateway = common::start_gateway(addr, config).await;

    let writer = {
        let refresh = gateway.refresh.clone();
        tokio::spawn(async move {
            for version in 1..=20 {
                let text = format!(
                    "{}{}",
                    static_route(1, "/gen", &format!("v{}", version)),
                    static_route(2, "/other", "x"),
                );
                refresh.apply_and_wait(common::routes(&text)).await.unwrap();
            }
        })
    };

    let client = common::client();
    for _ in 0..50 {
        let res = client.get(gateway.url("/gen")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        let body = res.text().await.unwrap();
        assert!(body.starts_with('v'), "unexpected body {}", body);
    }
    writer.await.unwrap();

    let body = client.get(gateway.url("/gen")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "v20");
}
