// Units hosted by the end-to-end cases.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use serde_json::json;

use crate::instance::HostedInstance;
use crate::unit::{EntryPoint, HandlerError, HttpMethod, Mounted, RawResponse, Reply, UnitDefinition};

pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
pub const DEMO_TIMEOUT: Duration = Duration::from_millis(300);

/// Unit mounted under `/sub` of the demo unit.
pub fn inner_unit() -> Arc<UnitDefinition> {
    UnitDefinition::builder("Inner")
        .entry_point(
            EntryPoint::blocking("hello", |_ctx, _args| Ok(Reply::json("hi from inner"))).returns::<String>(),
        )
        .build()
        .unwrap()
}

/// A unit touching every serving feature: default entry point, typed body
/// and query parameters, raw output, a slow handler and both mount kinds.
pub fn demo_unit() -> Arc<UnitDefinition> {
    let inner = inner_unit();
    UnitDefinition::builder("Demo")
        .doc("Exercises the serving stack.")
        .handler_timeout(DEMO_TIMEOUT)
        .entry_point(
            EntryPoint::blocking("predict", |_ctx, args| {
                let raw = args.raw().ok_or_else(|| HandlerError::http(400, "no request"))?;
                Ok(Reply::json(json!({"path": raw.path, "method": raw.method})))
            })
            .path("")
            .raw_args(),
        )
        .entry_point(
            EntryPoint::blocking("echo", |_ctx, args| Ok(Reply::json(args.get::<String>("input")?)))
                .param::<String>("input")
                .returns::<String>()
                .example(json!({"input": "hello"})),
        )
        .entry_point(
            EntryPoint::blocking("lookup", |_ctx, args| {
                let q: String = args.get("q")?;
                let limit: i64 = args.get("limit")?;
                Ok(Reply::json(json!({"q": q, "limit": limit})))
            })
            .method(HttpMethod::Get)
            .param::<String>("q")
            .param_default("limit", 10i64),
        )
        .entry_point(
            EntryPoint::blocking("image", |_ctx, _args| Ok(Reply::raw(RawResponse::png(PNG_MAGIC.to_vec()))))
                .returns_raw(),
        )
        .entry_point(EntryPoint::blocking("slow", |_ctx, _args| {
            std::thread::sleep(DEMO_TIMEOUT * 4);
            Ok(Reply::json(true))
        }))
        .entry_point(EntryPoint::mount("sub", move |_ctx| {
            Ok(Mounted::Unit(HostedInstance::builder(Arc::clone(&inner)).name("inner").build()))
        }))
        .entry_point(EntryPoint::mount("plain", |_ctx| {
            Ok(Mounted::Router(axum::Router::new().route("/ping", get(|| async { "pong" }))))
        }))
        .build()
        .unwrap()
}

/// Mounts a unit whose default entry point catches everything under `/child`.
pub fn nesting_unit() -> Arc<UnitDefinition> {
    let child = UnitDefinition::builder("Child")
        .entry_point(
            EntryPoint::blocking("anything", |_ctx, _args| Ok(Reply::json("child default")))
                .path("")
                .raw_args(),
        )
        .build()
        .unwrap();
    UnitDefinition::builder("Parent")
        .entry_point(EntryPoint::mount("child", move |_ctx| {
            Ok(Mounted::Unit(HostedInstance::new(Arc::clone(&child))))
        }))
        .build()
        .unwrap()
}

pub fn demo() -> Arc<HostedInstance> {
    HostedInstance::builder(demo_unit()).name("demo").build()
}

/// Mounts its own instance, which can never be assembled.
pub fn self_mounting() -> Arc<HostedInstance> {
    let def = UnitDefinition::builder("Ouroboros")
        .entry_point(EntryPoint::mount("again", |ctx| Ok(Mounted::Unit(Arc::clone(ctx.instance())))))
        .build()
        .unwrap();
    HostedInstance::new(def)
}

/// Initializer fails; the unit must never be served.
pub fn broken() -> Arc<HostedInstance> {
    let def = UnitDefinition::builder("Broken")
        .init(|_ctx| anyhow::bail!("weights missing"))
        .entry_point(EntryPoint::blocking("run", |_ctx, _args| Ok(Reply::json(1))))
        .build()
        .unwrap();
    HostedInstance::new(def)
}
