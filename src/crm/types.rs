//! CRM contact payloads.

use serde::{Deserialize, Serialize};

use crate::intake::SanitizedContactData;
use crate::store::LeadRecord;

/// Contact properties written to the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProperties {
    pub email: String,
    pub firstname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub message: String,
}

impl ContactProperties {
    fn build(name: &str, email: &str, phone: Option<&str>, message: &str) -> Self {
        let (firstname, lastname) = split_name(name);
        Self {
            email: email.to_string(),
            firstname,
            lastname,
            phone: phone.map(str::to_string),
            message: message.to_string(),
        }
    }

    pub fn from_sanitized(data: &SanitizedContactData) -> Self {
        Self::build(
            data.safe_name(),
            data.safe_email(),
            data.safe_phone(),
            data.safe_message(),
        )
    }

    /// Rebuild properties from a stored lead during reconciliation.
    pub fn from_record(record: &LeadRecord) -> Self {
        Self::build(
            &record.name,
            &record.email,
            record.phone.as_deref(),
            &record.message,
        )
    }
}

/// First word, then the remainder if any.
fn split_name(name: &str) -> (String, Option<String>) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => {
            let rest = rest.trim();
            (
                first.to_string(),
                (!rest.is_empty()).then(|| rest.to_string()),
            )
        }
        None => (name.to_string(), None),
    }
}

/// A contact as returned by the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrmContact {
    pub id: String,
}

/// Body of a create or update call.
#[derive(Debug, Serialize)]
pub(crate) struct ContactWrite<'a> {
    pub properties: &'a ContactProperties,
}

/// `POST /crm/v3/objects/contacts/search` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest<'a> {
    pub filter_groups: [FilterGroup<'a>; 1],
    pub properties: [&'static str; 1],
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct FilterGroup<'a> {
    pub filters: [Filter<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Filter<'a> {
    pub property_name: &'static str,
    pub operator: &'static str,
    pub value: &'a str,
}

impl<'a> SearchRequest<'a> {
    pub fn by_email(email: &'a str) -> Self {
        Self {
            filter_groups: [FilterGroup {
                filters: [Filter {
                    property_name: "email",
                    operator: "EQ",
                    value: email,
                }],
            }],
            properties: ["email"],
            limit: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<CrmContact>,
}
