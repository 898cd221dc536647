//! Shared sliding-window limiter over a Redis REST API (Upstash protocol).
//!
//! Each call runs one Lua script via `EVAL` that weighs the previous window's
//! count by the remaining overlap, so all instances see one consistent budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use crate::clock::Clock;
use crate::rate_limit::{RateLimitError, RateLimitIdentifier};

/// Decision returned by a distributed backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDecision {
    pub success: bool,
    pub remaining: u32,
}

/// A limiter whose state is shared across instances.
#[async_trait]
pub trait DistributedLimiter: Send + Sync {
    async fn limit(&self, id: &RateLimitIdentifier) -> Result<LimitDecision, RateLimitError>;
}

/// Returns -1 when the request must be denied, otherwise the remaining budget.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local current_key = KEYS[1]
local previous_key = KEYS[2]
local tokens = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local increment_by = tonumber(ARGV[4])

local current = tonumber(redis.call("GET", current_key) or "0")
local previous = tonumber(redis.call("GET", previous_key) or "0")
local weight = (now % window) / window
previous = math.floor((1 - weight) * previous)

if previous + current >= tokens then
  return -1
end

local new_value = redis.call("INCRBY", current_key, increment_by)
if new_value == increment_by then
  redis.call("PEXPIRE", current_key, window * 2 + 1000)
end
return tokens - (new_value + previous)
"#;

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Sliding-window limiter talking to a Redis REST endpoint.
pub struct RedisRestLimiter {
    client: reqwest::Client,
    url: String,
    prefix: String,
    max_requests: u32,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl RedisRestLimiter {
    pub fn new(
        url: &str,
        token: &str,
        prefix: &str,
        max_requests: u32,
        window: Duration,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() || token.trim().is_empty() {
            return Err(RateLimitError::Config(
                "redis REST url and token are required".into(),
            ));
        }
        let window_ms = i64::try_from(window.as_millis())
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| RateLimitError::Config("window must be positive".into()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| RateLimitError::Config("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RateLimitError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            prefix: prefix.to_string(),
            max_requests,
            window_ms,
            clock,
        })
    }

    fn keys(&self, id: &RateLimitIdentifier, now_ms: i64) -> (String, String) {
        let bucket = now_ms / self.window_ms;
        (
            format!("{}:{}:{}", self.prefix, id, bucket),
            format!("{}:{}:{}", self.prefix, id, bucket - 1),
        )
    }
}

#[async_trait]
impl DistributedLimiter for RedisRestLimiter {
    async fn limit(&self, id: &RateLimitIdentifier) -> Result<LimitDecision, RateLimitError> {
        let now_ms = self.clock.now().timestamp_millis();
        let (current, previous) = self.keys(id, now_ms);
        let command = serde_json::json!([
            "EVAL",
            SLIDING_WINDOW_SCRIPT,
            "2",
            current,
            previous,
            self.max_requests.to_string(),
            now_ms.to_string(),
            self.window_ms.to_string(),
            "1",
        ]);

        let response = self
            .client
            .post(&self.url)
            .json(&command)
            .send()
            .await
            .map_err(|e| RateLimitError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let reply: RestReply = response
            .json()
            .await
            .map_err(|e| RateLimitError::Decode(e.without_url().to_string()))?;

        if let Some(error) = reply.error {
            return Err(RateLimitError::Backend(error));
        }
        if !status.is_success() {
            return Err(RateLimitError::Backend(format!("status {}", status.as_u16())));
        }

        let remaining = reply
            .result
            .as_ref()
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| RateLimitError::Decode("missing integer result".into()))?;

        Ok(LimitDecision {
            success: remaining >= 0,
            remaining: u32::try_from(remaining.max(0)).unwrap_or(u32::MAX),
        })
    }
}

impl std::fmt::Debug for RedisRestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRestLimiter")
            .field("prefix", &self.prefix)
            .field("max_requests", &self.max_requests)
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}
