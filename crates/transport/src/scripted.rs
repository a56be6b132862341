//! Scripted transport for tests.
//!
//! Replays queued outcomes in order and records every request it receives.
//! An exhausted script answers with a connection error.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};

use crate::{HttpRequest, HttpResponse, Result, Transport, TransportError};

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: HttpResponse) -> &Self {
        locked(&self.script).push_back(Ok(response));
        self
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(HttpResponse::with_json(status, &body))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        locked(&self.script).push_back(Err(error));
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        locked(&self.requests).clone()
    }

    /// Number of requests whose URL ends with `suffix`.
    pub fn calls_to(&self, suffix: &str) -> usize {
        locked(&self.requests)
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }

    pub fn remaining(&self) -> usize {
        locked(&self.script).len()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>> {
        locked(&self.requests).push(request.clone());
        let next = locked(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into())));
        Box::pin(async move { next })
    }
}
