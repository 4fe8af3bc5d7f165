//! In-process stand-in for remote storage services
#![allow(dead_code)]

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse};
use std::sync::{Arc, Mutex};

/// One request as the fake backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

#[derive(Clone)]
struct Backend {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    respond: Responder,
}

/// A running fake backend; stops when dropped.
pub struct FakeBackend {
    server: actix_test::TestServer,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeBackend {
    /// Answer every request with the same status and body.
    pub fn start(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::start_with(move |_| (status, body.clone()))
    }

    /// Answer each request with whatever `respond` returns for it.
    pub fn start_with<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let backend = Backend {
            requests: Arc::new(Mutex::new(Vec::new())),
            respond: Arc::new(respond),
        };
        let requests = backend.requests.clone();

        let server = actix_test::start(move || {
            App::new()
                .app_data(web::Data::new(backend.clone()))
                .default_service(web::to(record))
        });

        Self { server, requests }
    }

    /// Base URL without trailing slash, e.g. `http://127.0.0.1:41234`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server.addr())
    }

    /// Everything received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(req: HttpRequest, body: web::Bytes, backend: web::Data<Backend>) -> HttpResponse {
    let recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.path().to_string(),
        query: req.query_string().to_string(),
        headers: req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: body.to_vec(),
    };

    let (status, reply) = (backend.respond)(&recorded);
    backend.requests.lock().unwrap().push(recorded);

    HttpResponse::build(StatusCode::from_u16(status).unwrap()).body(reply)
}
