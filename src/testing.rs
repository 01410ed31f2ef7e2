//! Scripted transport used by the unit tests.

use crate::connection::{ApiRequest, ApiResponse, Transport};
use crate::error::ApiError;
use std::collections::VecDeque;
use std::sync::{Barrier, Mutex};

struct Route {
    method: &'static str,
    path: String,
    responses: VecDeque<Result<ApiResponse, ApiError>>,
}

/// Replays canned answers per `(method, path)` and records every request.
///
/// The last answer of a route is repeated for later calls.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<ApiRequest>>,
    gate: Option<(Barrier, Barrier)>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        ScriptedTransport::default()
    }

    /// Every `send` waits on the first barrier when it starts and on the
    /// second before answering, so a test can act while a request is in flight.
    pub(crate) fn gated() -> Self {
        ScriptedTransport {
            gate: Some((Barrier::new(2), Barrier::new(2))),
            ..ScriptedTransport::default()
        }
    }

    pub(crate) fn entered(&self) {
        if let Some((entered, _)) = &self.gate {
            entered.wait();
        }
    }

    pub(crate) fn release(&self) {
        if let Some((_, release)) = &self.gate {
            release.wait();
        }
    }

    pub(crate) fn respond(&self, method: &'static str, path: &str, status: u16, body: &str) {
        self.push(
            method,
            path,
            Ok(ApiResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub(crate) fn fail(&self, method: &'static str, path: &str, error: ApiError) {
        self.push(method, path, Err(error));
    }

    fn push(&self, method: &'static str, path: &str, answer: Result<ApiResponse, ApiError>) {
        let mut routes = self.routes.lock().unwrap();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => route.responses.push_back(answer),
            None => routes.push(Route {
                method,
                path: path.to_string(),
                responses: VecDeque::from(vec![answer]),
            }),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: &str, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method.name() == method && r.path == path)
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.entered();
        let answer = {
            let mut routes = self.routes.lock().unwrap();
            match routes
                .iter_mut()
                .find(|r| r.method == request.method.name() && r.path == request.path)
            {
                Some(route) if route.responses.len() > 1 => route.responses.pop_front(),
                Some(route) => route.responses.front().cloned(),
                None => None,
            }
        };
        self.release();
        answer.unwrap_or_else(|| {
            Ok(ApiResponse {
                status: 404,
                body: format!(r#"{{"message":"no route for {}"}}"#, request.path),
            })
        })
    }
}
