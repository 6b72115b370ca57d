#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use envconfig::Envconfig;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use segment_action::config::Config;
use segment_action::server::serve;

/// A stand-in for the analytics collector's batch endpoint.
#[derive(Clone)]
pub struct FakeCollector {
    pub addr: SocketAddr,
    batches: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

impl FakeCollector {
    pub async fn start(status: StatusCode) -> Self {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/v1/batch", post(receive))
            .with_state((batches.clone(), status));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self { addr, batches }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Authorization header and body of every batch received so far.
    pub fn batches(&self) -> Vec<(Option<String>, Value)> {
        self.batches.lock().unwrap().clone()
    }
}

type Received = (Arc<Mutex<Vec<(Option<String>, Value)>>>, StatusCode);

async fn receive(
    State((batches, status)): State<Received>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    batches.lock().unwrap().push((auth, body));
    status
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_collector(collector: &FakeCollector) -> Self {
        let vars = HashMap::from([
            ("SEGMENT_ENDPOINT".to_owned(), collector.endpoint()),
            ("SEGMENT_MAX_BATCH_SIZE".to_owned(), "2".to_owned()),
            ("EXPORT_PROMETHEUS".to_owned(), "false".to_owned()),
            ("APP_VERSION".to_owned(), "9.9.9".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&vars).expect("invalid test config");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await })
                .await
                .expect("server failed")
        });

        Self { addr, shutdown }
    }

    pub async fn execute(&self, action: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("http://{}/actions/{}/execute", self.addr, action))
            .json(&body)
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
