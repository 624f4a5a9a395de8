mod common;

use common::*;
use gee_rpc::{Client, Options, RpcError, Server};
use log::*;

#[logfn]
#[rstest]
fn test_sum(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        debug!("server addr {:?}", addr);
        let client = Client::dial(&addr, &Options::default()).await.expect("dial");

        let reply: i64 =
            client.call("Foo.Sum", &Args { num1: 1, num2: 2 }).await.expect("call Foo.Sum");
        assert_eq!(reply, 3);
    });
}

#[logfn]
#[rstest]
fn test_parallel_calls(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        let client = Client::dial(&addr, &Options::default()).await.expect("dial");

        let mut handles = Vec::new();
        for i in 0..5i64 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let args = Args { num1: i, num2: i * i };
                let reply: i64 = client.call("Foo.Sum", &args).await.expect("call Foo.Sum");
                (i, reply)
            }));
        }
        for handle in handles {
            let (i, reply) = handle.await.expect("join");
            assert_eq!(reply, i + i * i);
        }
    });
}

#[logfn]
#[rstest]
fn test_close_is_idempotent(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        let client = Client::dial(&addr, &Options::default()).await.expect("dial");
        assert!(client.is_available());

        client.close().await.expect("first close");
        assert!(!client.is_available());
        assert_eq!(client.close().await.unwrap_err(), RpcError::Shutdown);

        // New calls are rejected without touching the wire.
        let r: Result<i64, _> = client.call("Foo.Sum", &Args { num1: 1, num2: 1 }).await;
        assert_eq!(r.unwrap_err(), RpcError::Shutdown);
    });
}

#[logfn]
#[rstest]
fn test_dispatch_errors_do_not_kill_the_connection(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        let client = Client::dial(&addr, &Options::default()).await.expect("dial");

        let r: Result<i64, _> = client.call("Foo.NoSuch", &()).await;
        match r.unwrap_err() {
            RpcError::Server(msg) => assert!(msg.contains("can't find method"), "got {:?}", msg),
            other => panic!("expected server error, got {:?}", other),
        }

        let r: Result<i64, _> = client.call("Bar.Sum", &()).await;
        match r.unwrap_err() {
            RpcError::Server(msg) => assert!(msg.contains("can't find service"), "got {:?}", msg),
            other => panic!("expected server error, got {:?}", other),
        }

        let r: Result<i64, _> = client.call("NoDot", &()).await;
        match r.unwrap_err() {
            RpcError::Server(msg) => assert!(msg.contains("ill-formed"), "got {:?}", msg),
            other => panic!("expected server error, got {:?}", other),
        }

        // The connection is still healthy after three failed lookups.
        let reply: i64 =
            client.call("Foo.Sum", &Args { num1: 4, num2: 5 }).await.expect("call Foo.Sum");
        assert_eq!(reply, 9);
    });
}

#[logfn]
#[rstest]
fn test_wrong_argument_shape(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        let client = Client::dial(&addr, &Options::default()).await.expect("dial");

        let r: Result<i64, _> = client.call("Foo.Sum", &"not an args struct").await;
        assert!(matches!(r.unwrap_err(), RpcError::Server(_)));

        let reply: i64 =
            client.call("Foo.Sum", &Args { num1: 2, num2: 2 }).await.expect("call Foo.Sum");
        assert_eq!(reply, 4);
    });
}

#[logfn]
#[rstest]
fn test_method_error_reaches_the_caller(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        let client = Client::dial(&addr, &Options::default()).await.expect("dial");

        let r: Result<i64, _> = client.call("Foo.Fail", &()).await;
        assert_eq!(r.unwrap_err(), RpcError::Server("foo failed".to_string()));
    });
}

#[logfn]
#[rstest]
fn test_json_codec(runner: TestRunner) {
    runner.block_on(async move {
        let addr = start_server().await;
        let opt = Options { codec_type: gee_rpc::CodecType::Json, ..Default::default() };
        let client = Client::dial(&addr, &opt).await.expect("dial");

        let reply: i64 =
            client.call("Foo.Sum", &Args { num1: 10, num2: 20 }).await.expect("call Foo.Sum");
        assert_eq!(reply, 30);
    });
}

#[logfn]
#[rstest]
fn test_default_server_facade(runner: TestRunner) {
    runner.block_on(async move {
        // The process-wide server behind the free functions. Only this test
        // touches it, so the one-time registration is safe.
        gee_rpc::register(foo_service()).expect("register");
        let addr = gee_rpc::listen("127.0.0.1:0").await.expect("listen");

        let client = Client::dial(&addr, &Options::default()).await.expect("dial");
        let reply: i64 =
            client.call("Foo.Sum", &Args { num1: 6, num2: 7 }).await.expect("call Foo.Sum");
        assert_eq!(reply, 13);
    });
}

#[logfn]
#[rstest]
fn test_duplicate_service_rejected(runner: TestRunner) {
    runner.block_on(async move {
        let server = Server::new();
        server.register(foo_service()).expect("first register");
        let err = server.register(foo_service()).unwrap_err();
        assert!(err.to_string().contains("already defined"), "got {:?}", err);
    });
}
