//! Process-local lead store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::store::types::{LeadId, LeadPatch, LeadRecord, NewLead};
use crate::store::{LeadStore, StoreError, StoreResult};

/// Lead store backed by a concurrent map. Not durable.
#[derive(Clone)]
pub struct MemoryLeadStore {
    leads: Arc<DashMap<LeadId, LeadRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leads: Arc::new(DashMap::new()),
            clock,
        }
    }

    pub fn get(&self, id: &LeadId) -> Option<LeadRecord> {
        self.leads.get(id).map(|r| r.value().clone())
    }

    /// All leads, oldest first.
    pub fn all(&self) -> Vec<LeadRecord> {
        let mut leads: Vec<LeadRecord> = self.leads.iter().map(|r| r.value().clone()).collect();
        leads.sort_by_key(|l| l.created_at);
        leads
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

impl Default for MemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn insert_lead(&self, lead: NewLead) -> StoreResult<LeadRecord> {
        let id = LeadId::from(Uuid::new_v4().to_string());
        let record = LeadRecord::created(id.clone(), lead, self.clock.now());
        self.leads.insert(id, record.clone());
        Ok(record)
    }

    async fn update_lead(&self, id: &LeadId, patch: &LeadPatch) -> StoreResult<()> {
        match self.leads.get_mut(id) {
            Some(mut record) => {
                record.apply(patch);
                Ok(())
            }
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn leads_needing_sync(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LeadRecord>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|l| l.needs_reconciliation(stale_before))
            .take(limit)
            .collect())
    }
}
