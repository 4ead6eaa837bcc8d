//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::SessionManager;
use crate::notify::{Notice, Notifier};
use crate::store::{CredentialPair, CredentialStore, MemoryStore};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// One request as seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

type Handler = dyn Fn(&ApiRequest, Option<&str>) -> ApiResponse + Send + Sync;

/// Transport that answers from a closure and records every call.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest, Option<&str>) -> ApiResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Hold responses for `path` for `delay` before answering.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> ApiResponse {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            bearer: bearer.map(str::to_string),
            body: request.body.clone(),
        });

        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }

        (self.handler)(request, bearer)
    }
}

/// A session wired to a scripted transport and an in-memory store.
pub struct Harness {
    pub session: SessionManager,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<MemoryStore>,
    pub notices: tokio::sync::mpsc::UnboundedReceiver<Notice>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport, pair: Option<CredentialPair>) -> Self {
        let transport = Arc::new(transport);
        let store = Arc::new(match pair {
            Some(pair) => MemoryStore::with_pair(pair),
            None => MemoryStore::default(),
        });
        let (notifier, notices) = Notifier::channel();
        let session = SessionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            notifier,
        );

        Self {
            session,
            transport,
            store,
            notices,
        }
    }

    pub fn stored_pair(&self) -> Option<CredentialPair> {
        self.store.load().unwrap()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }
}

pub fn ok(data: Value) -> ApiResponse {
    ApiResponse::ok(200, data)
}

pub fn unauthorized() -> ApiResponse {
    ApiResponse::failure(401, "Given token not valid for any token type")
}
