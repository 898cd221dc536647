//! HubSpot contacts API client.
//!
//! # Wire Format
//! - Lookup: `POST /crm/v3/objects/contacts/search` (email EQ filter, limit 1)
//! - Create: `POST /crm/v3/objects/contacts`
//! - Update: `PATCH /crm/v3/objects/contacts/{id}`
//!
//! Writes carry an `Idempotency-Key` header so a retried create after a
//! lost response does not produce a duplicate contact.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Response;
use url::Url;

use crate::config::CrmConfig;
use crate::crm::types::{ContactProperties, ContactWrite, CrmContact, SearchRequest, SearchResponse};
use crate::crm::{CrmClient, CrmError, CrmResult};
use crate::identity::IdempotencyKey;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Client for the HubSpot CRM v3 contacts API.
#[derive(Debug, Clone)]
pub struct HubSpotClient {
    client: reqwest::Client,
    base: Url,
}

impl HubSpotClient {
    pub fn new(config: &CrmConfig) -> CrmResult<Self> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CrmError::Config("crm.access_token is not set".into()))?;

        let mut base: Url = config
            .base_url
            .parse()
            .map_err(|e| CrmError::Config(format!("invalid CRM base URL: {}", e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| CrmError::Config("access token is not a valid header".into()))?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrmError::Config(e.to_string()))?;

        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> CrmResult<Url> {
        self.base
            .join(path)
            .map_err(|e| CrmError::Config(format!("invalid CRM path: {}", e)))
    }
}

fn transport(e: reqwest::Error) -> CrmError {
    CrmError::Transport(e.without_url().to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> CrmResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(CrmError::Status {
            status: status.as_u16(),
        });
    }
    response
        .json()
        .await
        .map_err(|e| CrmError::Decode(e.without_url().to_string()))
}

#[async_trait]
impl CrmClient for HubSpotClient {
    async fn find_contact_by_email(&self, email: &str) -> CrmResult<Option<CrmContact>> {
        let response = self
            .client
            .post(self.url("crm/v3/objects/contacts/search")?)
            .json(&SearchRequest::by_email(email))
            .send()
            .await
            .map_err(transport)?;
        let found: SearchResponse = decode(response).await?;
        Ok(found.results.into_iter().next())
    }

    async fn create_contact(
        &self,
        properties: &ContactProperties,
        key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        let response = self
            .client
            .post(self.url("crm/v3/objects/contacts")?)
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(&ContactWrite { properties })
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        properties: &ContactProperties,
        key: &IdempotencyKey,
    ) -> CrmResult<CrmContact> {
        let mut url = self.url("crm/v3/objects/contacts/")?;
        url.path_segments_mut()
            .map_err(|_| CrmError::Config("CRM base URL cannot be a base".into()))?
            .pop_if_empty()
            .push(contact_id);

        let response = self
            .client
            .patch(url)
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(&ContactWrite { properties })
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}
