mod common;

use common::*;
use gee_rpc::registry::{heartbeat, Registry, DEFAULT_PATH};
use gee_rpc::xclient::{Discovery, RegistryDiscovery, SelectMode, XClient};
use gee_rpc::Options;
use log::*;
use std::time::Duration;

async fn serve_registry(registry: Registry) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move { registry.serve(listener).await });
    format!("http://{}{}", addr, DEFAULT_PATH)
}

#[logfn]
#[rstest]
fn test_registry_http_surface(runner: TestRunner) {
    runner.block_on(async move {
        let url = serve_registry(Registry::new(Duration::from_secs(60))).await;
        let http = reqwest::Client::new();

        // Empty at first.
        let resp = http.get(&url).send().await.expect("get");
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["X-Geerpc-Servers"].to_str().expect("header"), "");

        // Heartbeats register; the list comes back sorted.
        for addr in ["tcp@b:1", "tcp@a:1"] {
            let resp = http
                .post(&url)
                .header("X-Geerpc-Server", addr)
                .send()
                .await
                .expect("post");
            assert_eq!(resp.status(), 200);
        }
        let resp = http.get(&url).send().await.expect("get");
        assert_eq!(
            resp.headers()["X-Geerpc-Servers"].to_str().expect("header"),
            "tcp@a:1,tcp@b:1"
        );

        // A heartbeat without the address header is a server error.
        let resp = http.post(&url).send().await.expect("post");
        assert_eq!(resp.status(), 500);

        // Anything but GET/POST is rejected.
        let resp = http.put(&url).send().await.expect("put");
        assert_eq!(resp.status(), 405);
    });
}

#[logfn]
#[rstest]
fn test_registry_expiry_over_http(runner: TestRunner) {
    runner.block_on(async move {
        let url = serve_registry(Registry::new(Duration::from_millis(200))).await;
        let http = reqwest::Client::new();

        http.post(&url)
            .header("X-Geerpc-Server", "tcp@gone:1")
            .send()
            .await
            .expect("post");
        let resp = http.get(&url).send().await.expect("get");
        assert_eq!(resp.headers()["X-Geerpc-Servers"].to_str().expect("header"), "tcp@gone:1");

        tokio::time::sleep(Duration::from_millis(300)).await;
        let resp = http.get(&url).send().await.expect("get");
        assert_eq!(resp.headers()["X-Geerpc-Servers"].to_str().expect("header"), "");
    });
}

#[logfn]
#[rstest]
fn test_heartbeat_keeps_server_alive(runner: TestRunner) {
    runner.block_on(async move {
        let url = serve_registry(Registry::new(Duration::from_millis(400))).await;
        heartbeat(&url, "tcp@steady:1", Duration::from_millis(100)).await.expect("heartbeat");

        tokio::time::sleep(Duration::from_millis(600)).await;
        let http = reqwest::Client::new();
        let resp = http.get(&url).send().await.expect("get");
        // Still listed well past the timeout thanks to the beats.
        assert_eq!(resp.headers()["X-Geerpc-Servers"].to_str().expect("header"), "tcp@steady:1");
    });
}

#[logfn]
#[rstest]
fn test_registry_discovery_end_to_end(runner: TestRunner) {
    runner.block_on(async move {
        let url = serve_registry(Registry::new(Duration::from_secs(60))).await;

        let addr1 = start_server().await;
        let addr2 = start_server().await;
        heartbeat(&url, &format!("tcp@{}", addr1), Duration::ZERO).await.expect("heartbeat");
        heartbeat(&url, &format!("tcp@{}", addr2), Duration::ZERO).await.expect("heartbeat");

        let d = RegistryDiscovery::new(&url, Duration::ZERO);
        let all = d.get_all().await.expect("get_all");
        assert_eq!(all.len(), 2, "discovered {:?}", all);

        let xc = XClient::new(d, SelectMode::RoundRobin, Options::default());
        for i in 0..4i64 {
            let reply: i64 = xc
                .call("Foo.Sum", &Args { num1: i, num2: 10 })
                .await
                .expect("call Foo.Sum");
            assert_eq!(reply, i + 10);
        }
        let reply: i64 =
            xc.broadcast("Foo.Sum", &Args { num1: 20, num2: 1 }).await.expect("broadcast");
        assert_eq!(reply, 21);
        info!("registry-backed xclient ok");
        xc.close().await;
    });
}
