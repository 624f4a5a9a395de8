#![allow(dead_code)]

use captains_log::*;
use gee_rpc::{Server, Service};
use rstest::*;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

pub use captains_log::logfn;
pub use rstest::rstest;

#[fixture]
pub fn runner() -> TestRunner {
    TestRunner::new()
}

pub struct TestRunner {
    rt: Runtime,
}

impl TestRunner {
    pub fn new() -> Self {
        recipe::raw_file_logger("/tmp/gee_rpc_test.log", Level::Trace).test().build().expect("log");
        Self {
            rt: tokio::runtime::Builder::new_multi_thread()
                .worker_threads(8)
                .enable_all()
                .build()
                .unwrap(),
        }
    }

    pub fn block_on<F: std::future::Future<Output = ()> + Send + 'static>(&self, f: F) {
        self.rt.block_on(f);
    }
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Args {
    pub num1: i64,
    pub num2: i64,
}

/// The standard test service: arithmetic, a sleeper and a failer.
pub fn foo_service() -> Service {
    Service::new("Foo")
        .method("Sum", |args: Args| async move { Ok::<_, String>(args.num1 + args.num2) })
        .method("Sleep", |ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, String>(ms)
        })
        .method("Fail", |_: ()| async move { Err::<i64, _>("foo failed") })
}

/// A `Foo` whose `Sum` counts invocations, for distribution assertions.
pub fn counting_foo_service(counter: Arc<AtomicU64>) -> Service {
    Service::new("Foo").method("Sum", move |args: Args| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(args.num1 + args.num2)
        }
    })
}

/// Starts a fresh server with [foo_service] on an ephemeral port; returns
/// the bound address.
pub async fn start_server() -> String {
    let server = Server::new();
    server.register(foo_service()).expect("register");
    server.listen("127.0.0.1:0").await.expect("listen")
}
