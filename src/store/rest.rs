//! PostgREST-compatible lead store.
//!
//! # Wire Format
//! - Insert: `POST /rest/v1/{table}` with `Prefer: return=representation`,
//!   response is a one-element array holding the created row
//! - Patch: `PATCH /rest/v1/{table}?id=eq.{id}`
//! - Reconciliation: `GET /rest/v1/{table}?or=(...)` selecting `needs_sync` rows
//!   and stale, never-attempted, non-suspicious `pending` rows
//!
//! # Security Constraints
//! - The service key is sent as both `apikey` and bearer token and never logged

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use url::Url;

use crate::config::StoreConfig;
use crate::store::types::{LeadId, LeadPatch, LeadRecord, NewLead};
use crate::store::{LeadStore, StoreError, StoreResult};

/// Lead store speaking the PostgREST dialect.
#[derive(Debug, Clone)]
pub struct RestLeadStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl RestLeadStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Config("store.url is not set".to_string()))?;
        let mut base: Url = base
            .parse()
            .map_err(|e| StoreError::Config(format!("invalid store URL: {}", e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(&format!("rest/v1/{}", config.table))
            .map_err(|e| StoreError::Config(format!("invalid table name: {}", e)))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref() {
            let mut apikey = HeaderValue::from_str(key)
                .map_err(|_| StoreError::Config("store API key is not a valid header".into()))?;
            apikey.set_sensitive(true);
            let mut bearer = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| StoreError::Config("store API key is not a valid header".into()))?;
            bearer.set_sensitive(true);
            headers.insert("apikey", apikey);
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    fn filtered(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in pairs {
                query.append_pair(k, v);
            }
        }
        url
    }
}

/// PostgREST `or` filter matching leads a reconciliation pass should retry.
fn reconcile_filter(stale_before: DateTime<Utc>) -> String {
    format!(
        "(hubspot_sync_status.eq.needs_sync,and(hubspot_sync_status.eq.pending,\
         is_suspicious.is.false,hubspot_last_sync_attempt.is.null,created_at.lt.\"{}\"))",
        stale_before.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.without_url().to_string())
}

#[async_trait]
impl LeadStore for RestLeadStore {
    async fn insert_lead(&self, lead: NewLead) -> StoreResult<LeadRecord> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Prefer", "return=representation")
            .json(&lead.insert_row())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
            });
        }

        let rows: Vec<LeadRecord> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.without_url().to_string()))?;

        let record = rows.into_iter().next().ok_or(StoreError::MissingId)?;
        if record.id.as_str().is_empty() {
            return Err(StoreError::MissingId);
        }
        Ok(record)
    }

    async fn update_lead(&self, id: &LeadId, patch: &LeadPatch) -> StoreResult<()> {
        let filter = format!("eq.{}", id);
        let response = self
            .client
            .patch(self.filtered(&[("id", filter.as_str())]))
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn leads_needing_sync(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LeadRecord>> {
        let limit = limit.to_string();
        let filter = reconcile_filter(stale_before);
        let url = self.filtered(&[
            ("select", "*"),
            ("or", filter.as_str()),
            ("order", "created_at.asc"),
            ("limit", limit.as_str()),
        ]);

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.without_url().to_string()))
    }
}
