//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lead_intake::config::{Environment, IntakeConfig};
use lead_intake::crm::{ContactProperties, CrmClient, CrmContact, CrmError, CrmResult};
use lead_intake::identity::IdempotencyKey;
use lead_intake::intake::ContactSubmission;
use lead_intake::resilience::Sleeper;
use lead_intake::store::{LeadId, LeadPatch, LeadRecord, LeadStore, NewLead, StoreError, StoreResult};

pub const SITE: &str = "https://www.example.com";

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        201 => "201 Created",
        400 => "400 Bad Request",
        401 => "401 Unauthorized",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a programmable JSON backend on an ephemeral port.
///
/// `f` sees every request; all requests are also recorded.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Captured)
where
    F: Fn(CapturedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);
    let log = captured.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        log.lock().unwrap().push(request.clone());
                        let (status, body) = f(request).await;
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, captured)
}

/// Defaults for a production-like deployment at `SITE`.
pub fn test_config() -> IntakeConfig {
    let mut config = IntakeConfig::default();
    config.site.site_url = SITE.to_string();
    config.site.environment = Environment::Production;
    config
}

pub fn submission() -> ContactSubmission {
    ContactSubmission {
        name: "Ann Lee".into(),
        email: "ann@example.com".into(),
        phone: None,
        message: "Hello, I need help.".into(),
        website: None,
    }
}

/// Headers of a same-site browser request from `ip`.
pub fn browser_headers(ip: &'static str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("origin", HeaderValue::from_static(SITE));
    h.insert("x-vercel-forwarded-for", HeaderValue::from_static(ip));
    h
}

/// Sleeper that returns immediately and counts calls.
#[derive(Default)]
pub struct NoopSleeper {
    pub calls: AtomicU32,
}

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// CRM fake failing the first `failures` attempts with a 503.
pub struct ScriptedCrm {
    pub failures: u32,
    pub attempts: AtomicU32,
    pub creates: AtomicU32,
    pub keys: Mutex<Vec<String>>,
}

impl ScriptedCrm {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            creates: AtomicU32::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CrmClient for ScriptedCrm {
    async fn find_contact_by_email(&self, _email: &str) -> CrmResult<Option<CrmContact>> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(CrmError::Status { status: 503 });
        }
        Ok(None)
    }

    async fn create_contact(
        &self,
        _properties: &ContactProperties,
        key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.to_string());
        Ok(CrmContact { id: "501".into() })
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        _properties: &ContactProperties,
        _key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        Ok(CrmContact {
            id: contact_id.to_string(),
        })
    }
}

/// Store that rejects every write.
#[derive(Default)]
pub struct FailingStore {
    pub inserts: AtomicU32,
}

#[async_trait]
impl LeadStore for FailingStore {
    async fn insert_lead(&self, _lead: NewLead) -> StoreResult<LeadRecord> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Rejected { status: 503 })
    }

    async fn update_lead(&self, id: &LeadId, _patch: &LeadPatch) -> StoreResult<()> {
        Err(StoreError::NotFound(id.clone()))
    }

    async fn leads_needing_sync(
        &self,
        _stale_before: DateTime<Utc>,
        _limit: usize,
    ) -> StoreResult<Vec<LeadRecord>> {
        Ok(Vec::new())
    }
}

/// Store whose inserts panic.
pub struct PanickingStore;

#[async_trait]
impl LeadStore for PanickingStore {
    async fn insert_lead(&self, _lead: NewLead) -> StoreResult<LeadRecord> {
        panic!("lead table schema mismatch");
    }

    async fn update_lead(&self, id: &LeadId, _patch: &LeadPatch) -> StoreResult<()> {
        Err(StoreError::NotFound(id.clone()))
    }

    async fn leads_needing_sync(
        &self,
        _stale_before: DateTime<Utc>,
        _limit: usize,
    ) -> StoreResult<Vec<LeadRecord>> {
        Ok(Vec::new())
    }
}

/// CRM whose lookups take `delay` and then fail with a 503.
pub struct SlowCrm {
    pub delay: Duration,
    pub lookups: AtomicU32,
}

impl SlowCrm {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            lookups: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CrmClient for SlowCrm {
    async fn find_contact_by_email(&self, _email: &str) -> CrmResult<Option<CrmContact>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Err(CrmError::Status { status: 503 })
    }

    async fn create_contact(
        &self,
        _properties: &ContactProperties,
        _key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        Ok(CrmContact { id: "601".into() })
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        _properties: &ContactProperties,
        _key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        Ok(CrmContact {
            id: contact_id.to_string(),
        })
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
