//! Service definition and method dispatch.
//!
//! A [Service] maps method names to typed handlers. Registration supplies
//! the types: each handler is wrapped in a trampoline that decodes the
//! argument with the connection's codec, awaits the handler, and encodes
//! the reply. From there on the dispatch path is untyped `(codec, bytes)`,
//! which is what lets one registered service serve connections negotiated
//! with different codecs.

use gee_rpc_codec::AnyCodec;
use gee_rpc_core::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) type MethodFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, String>> + Send>>;
type Handler = Box<dyn Fn(AnyCodec, Vec<u8>) -> MethodFuture + Send + Sync>;

/// Only exported identifiers are callable over the wire: leading uppercase,
/// alphanumeric/underscore after that.
fn is_exported(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// One callable method: its trampoline plus an invocation counter.
pub struct MethodType {
    name: String,
    num_calls: AtomicU64,
    handler: Handler,
}

impl MethodType {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn call(&self, codec: AnyCodec, body: Vec<u8>) -> MethodFuture {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        (self.handler)(codec, body)
    }
}

impl fmt::Debug for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "method {} ({} calls)", self.name, self.num_calls())
    }
}

/// A named bundle of methods, registered on a
/// [Server](crate::server::Server) under its name.
///
/// ```
/// use gee_rpc::Service;
/// use serde_derive::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Args { num1: i64, num2: i64 }
///
/// let svc = Service::new("Foo")
///     .method("Sum", |args: Args| async move { Ok::<_, String>(args.num1 + args.num2) });
/// assert!(svc.find_method("Sum").is_some());
/// ```
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodType>>,
}

impl Service {
    /// Panics if `name` is not an exported identifier. Requiring the caller
    /// to pick a public-looking name keeps the wire surface explicit, the
    /// same contract the method filter enforces.
    pub fn new(name: &str) -> Self {
        if !is_exported(name) {
            panic!("rpc: {:?} is not a valid service name", name);
        }
        Self { name: name.to_string(), methods: HashMap::new() }
    }

    /// Registers `handler` under `name`.
    ///
    /// The handler takes its argument by value and resolves to
    /// `Result<Reply, E>`; an `Err` travels back to the caller as the
    /// rendered error string. Panics on a non-exported or duplicate method
    /// name, both programmer errors.
    pub fn method<A, R, E, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        if !is_exported(name) {
            panic!("rpc: {:?} is not a valid method name", name);
        }
        let trampoline: Handler = Box::new(move |codec: AnyCodec, body: Vec<u8>| {
            let args: A = match codec.decode(&body) {
                Ok(args) => args,
                Err(e) => return Box::pin(std::future::ready(Err(e.to_string()))),
            };
            let fut = handler(args);
            Box::pin(async move {
                match fut.await {
                    Ok(reply) => codec.encode(&reply).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            })
        });
        let mtype = MethodType {
            name: name.to_string(),
            num_calls: AtomicU64::new(0),
            handler: trampoline,
        };
        if self.methods.insert(name.to_string(), Arc::new(mtype)).is_some() {
            panic!("rpc: method {} already defined on service {}", name, self.name);
        }
        log::info!("rpc server: register {}.{}", self.name, name);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find_method(&self, name: &str) -> Option<Arc<MethodType>> {
        self.methods.get(name).cloned()
    }

    /// Methods in name order, for the debug view.
    pub fn methods(&self) -> Vec<Arc<MethodType>> {
        let mut all: Vec<_> = self.methods.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "service {} ({} methods)", self.name, self.methods.len())
    }
}
