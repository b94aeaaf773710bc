//! Shared harness for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

use vsphere_secrets::{
    api::build_router,
    backend::Backend,
    domain::LeaseDefaults,
    provider::{SimulatorFactory, SimulatorProvider},
    settings::{EnvOverrides, OverrideSource, SettingsResolver},
    storage::InMemoryStorage,
};

pub const ADMIN_USER: &str = "administrator@vsphere.local";
pub const ADMIN_PASSWORD: &str = "admin-pw";

pub struct TestApp {
    pub backend: Arc<Backend>,
    pub factory: SimulatorFactory,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.backend.clone())
    }

    pub fn simulator(&self) -> &Arc<SimulatorProvider> {
        self.factory.provider()
    }

    /// Store a config pointing at the simulator's admin account.
    pub async fn configure(&self) {
        let response = send(
            self,
            Method::POST,
            "/v1/config",
            Some(json!({
                "url": "https://vcenter.test.local",
                "username": ADMIN_USER,
                "password": ADMIN_PASSWORD,
            })),
        )
        .await;
        assert!(response.status().is_success(), "config write failed: {}", response.status());
    }
}

/// Simulator with the admin account plus the roles and groups dynamic tests use.
pub fn simulator() -> SimulatorProvider {
    SimulatorProvider::new()
        .with_account(ADMIN_USER, ADMIN_PASSWORD)
        .with_role("ReadOnly")
        .with_role("VirtualMachineUser")
        .with_group("operators")
}

pub fn setup_app(simulator: SimulatorProvider) -> TestApp {
    setup_app_with(simulator, OverrideSource::Fixed(EnvOverrides::default()))
}

pub fn setup_app_with(simulator: SimulatorProvider, overrides: OverrideSource) -> TestApp {
    let factory = SimulatorFactory::new(Arc::new(simulator));
    let backend = Backend::with_components(
        Arc::new(InMemoryStorage::new()),
        Arc::new(factory.clone()),
        SettingsResolver::default(),
        overrides,
        LeaseDefaults::default(),
    );
    TestApp { backend: Arc::new(backend), factory }
}

pub async fn send(app: &TestApp, method: Method, path: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(path);

    let request = if let Some(json) = body {
        let bytes = serde_json::to_vec(&json).expect("serialize body");
        builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("build request")
    } else {
        builder.body(Body::empty()).expect("build request")
    };

    app.router().oneshot(request).await.expect("request")
}

pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes =
        to_bytes(response.into_body(), usize::MAX).await.expect("read response body as bytes");
    serde_json::from_slice(&bytes).expect("parse json response")
}
