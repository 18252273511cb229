#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use clap::Parser;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use sublist_web_rs::config::Settings;
use sublist_web_rs::resolver::{Resolve, Resolved};
use sublist_web_rs::server::{self, AppState};

/// Answers from a fixed table; every other name is NXDOMAIN.
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    answers: HashMap<String, Resolved>,
}

impl MapResolver {
    pub fn with(mut self, host: &str, ip: &str, cname: Option<&str>) -> Self {
        let addr: IpAddr = ip.parse().expect("test address");
        self.answers.insert(
            host.to_string(),
            Resolved {
                addresses: vec![addr],
                cname: cname.map(str::to_string),
            },
        );
        self
    }

    /// `www` and `api` of example.com.
    pub fn example() -> Self {
        MapResolver::default()
            .with("www.example.com", "93.184.216.34", None)
            .with("api.example.com", "93.184.216.35", Some("edge.example.net"))
    }
}

#[async_trait]
impl Resolve for MapResolver {
    async fn resolve(&self, host: &str) -> Result<Resolved> {
        self.answers
            .get(host)
            .cloned()
            .ok_or_else(|| anyhow!("NXDOMAIN {host}"))
    }
}

/// Blocks every lookup until `gate` is cancelled, then defers to `inner`.
#[derive(Debug, Clone)]
pub struct GatedResolver {
    pub gate: CancellationToken,
    inner: MapResolver,
}

impl GatedResolver {
    pub fn new(inner: MapResolver) -> Self {
        Self {
            gate: CancellationToken::new(),
            inner,
        }
    }
}

#[async_trait]
impl Resolve for GatedResolver {
    async fn resolve(&self, host: &str) -> Result<Resolved> {
        self.gate.cancelled().await;
        self.inner.resolve(host).await
    }
}

pub fn settings(extra: &[&str]) -> Settings {
    let mut args = vec!["sublist-web-rs", "--ui-dir", "ui"];
    args.extend_from_slice(extra);
    Settings::parse_from(args)
}

pub fn app(settings: Settings, resolver: Arc<dyn Resolve>) -> (Router, AppState) {
    let state = AppState::new(settings, resolver);
    (server::router(state.clone()), state)
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("UTF-8 body")
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> Reply {
    let resp = router.clone().oneshot(req).await.expect("infallible router");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec();
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn get(router: &Router, uri: &str) -> Reply {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).expect("request"),
    )
    .await
}

pub async fn delete(router: &Router, uri: &str) -> Reply {
    send(
        router,
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    )
    .await
}

pub async fn post_json(router: &Router, uri: &str, client: &str, body: Value) -> Reply {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(body.to_string()))
            .expect("request"),
    )
    .await
}

/// Start a scan and return its id.
pub async fn start_scan(router: &Router, client: &str, domain: &str) -> String {
    let reply = post_json(router, "/api/scan", client, serde_json::json!({ "domain": domain })).await;
    assert_eq!(reply.status, StatusCode::OK, "start failed: {}", reply.text());
    reply.json()["scanId"]
        .as_str()
        .expect("scanId")
        .to_string()
}

/// Poll the detail endpoint until `done` accepts the status, recording every status seen.
pub async fn poll_until(
    router: &Router,
    scan_id: &str,
    done: impl Fn(&str) -> bool,
) -> (Value, Vec<String>) {
    let mut seen: Vec<String> = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let reply = get(router, &format!("/api/scan/{scan_id}")).await;
        assert_eq!(reply.status, StatusCode::OK);
        let record = reply.json();
        let status = record["status"].as_str().expect("status").to_string();
        if seen.last() != Some(&status) {
            seen.push(status.clone());
        }
        if done(&status) {
            return (record, seen);
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "scan {scan_id} stuck in {status}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn is_terminal(status: &str) -> bool {
    status == "completed" || status == "failed"
}
