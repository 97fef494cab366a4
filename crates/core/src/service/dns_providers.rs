//! DNS provider credential records.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use easyacme_common::{DnsProviderId, EasyAcmeError, EasyAcmeResult};

use crate::dns::{DnsProviderType, ProviderRegistry};
use crate::model::{DnsProviderRecord, DnsProviderSecrets, DnsProviderView, Page, PageRequest};
use crate::store::Store;

/// Input of [`DnsProviderService::create`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDnsProvider {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub notes: String,
}

/// Input of [`DnsProviderService::update`]; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDnsProvider {
    pub name: Option<String>,
    pub secret_id: Option<String>,
    /// An empty key also keeps the stored one
    pub secret_key: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsProviderFilter {
    pub name: Option<String>,
    pub provider_type: Option<DnsProviderType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsProviderStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct DnsProviderService {
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
}

impl DnsProviderService {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn create(&self, request: CreateDnsProvider) -> EasyAcmeResult<DnsProviderView> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(EasyAcmeError::validation("DNS provider name is required"));
        }
        let provider_type: DnsProviderType = request.provider_type.parse()?;
        if !self.registry.supports(provider_type) {
            return Err(EasyAcmeError::validation(format!(
                "unsupported DNS provider type: {}",
                request.provider_type
            )));
        }

        let now = Utc::now();
        let record = DnsProviderRecord {
            id: DnsProviderId::generate(),
            name: name.to_string(),
            provider_type,
            secret_id: request.secret_id.trim().to_string(),
            secret_key: request.secret_key.trim().to_string(),
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        // Reject credential shapes the vendor cannot use before storing them
        self.registry.build(&record)?;
        self.store.insert_dns_provider(record.clone())?;

        info!(dns_provider_id = %record.id, provider = %provider_type, "Created DNS provider");
        Ok(record.view())
    }

    pub fn get(&self, id: &DnsProviderId) -> EasyAcmeResult<DnsProviderView> {
        Ok(self.load(id)?.view())
    }

    pub(crate) fn load(&self, id: &DnsProviderId) -> EasyAcmeResult<DnsProviderRecord> {
        self.store
            .dns_provider(id)?
            .ok_or_else(|| EasyAcmeError::not_found("DNS provider", id.as_str()))
    }

    pub fn list(
        &self,
        filter: &DnsProviderFilter,
        page: PageRequest,
    ) -> EasyAcmeResult<Page<DnsProviderView>> {
        let needle = filter.name.as_deref().map(str::to_lowercase);
        let mut records: Vec<_> = self
            .store
            .dns_providers()?
            .into_iter()
            .filter(|r| {
                needle
                    .as_deref()
                    .map_or(true, |n| r.name.to_lowercase().contains(n))
            })
            .filter(|r| filter.provider_type.map_or(true, |t| r.provider_type == t))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(records.iter().map(DnsProviderRecord::view).collect()))
    }

    pub fn update(
        &self,
        id: &DnsProviderId,
        request: UpdateDnsProvider,
    ) -> EasyAcmeResult<DnsProviderView> {
        let mut record = self.load(id)?;
        if let Some(name) = request.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(EasyAcmeError::validation("DNS provider name is required"));
            }
            record.name = name;
        }
        if let Some(secret_id) = request.secret_id {
            record.secret_id = secret_id.trim().to_string();
        }
        if let Some(secret_key) = request.secret_key.filter(|k| !k.trim().is_empty()) {
            record.secret_key = secret_key.trim().to_string();
        }
        if let Some(notes) = request.notes {
            record.notes = notes;
        }
        record.updated_at = Utc::now();

        self.registry.build(&record)?;
        self.store.update_dns_provider(record.clone())?;
        info!(dns_provider_id = %id, "Updated DNS provider");
        Ok(record.view())
    }

    pub fn delete(&self, id: &DnsProviderId) -> EasyAcmeResult<()> {
        if !self.store.delete_dns_provider(id)? {
            return Err(EasyAcmeError::not_found("DNS provider", id.as_str()));
        }
        info!(dns_provider_id = %id, "Deleted DNS provider");
        Ok(())
    }

    /// Delete every listed record; unknown ids are skipped. Returns the count removed.
    pub fn delete_many(&self, ids: &[DnsProviderId]) -> EasyAcmeResult<usize> {
        if ids.is_empty() {
            return Err(EasyAcmeError::validation("no DNS provider ids given"));
        }
        let mut removed = 0;
        for id in ids {
            if self.store.delete_dns_provider(id)? {
                removed += 1;
            }
        }
        info!(requested = ids.len(), removed, "Deleted DNS providers");
        Ok(removed)
    }

    /// The only read path that returns the secret key
    pub fn reveal(&self, id: &DnsProviderId) -> EasyAcmeResult<DnsProviderSecrets> {
        let record = self.load(id)?;
        info!(dns_provider_id = %id, "Revealed DNS provider secrets");
        Ok(DnsProviderSecrets {
            id: record.id,
            secret_id: record.secret_id,
            secret_key: record.secret_key,
        })
    }

    pub fn stats(&self) -> EasyAcmeResult<DnsProviderStats> {
        let records = self.store.dns_providers()?;
        let mut by_type = BTreeMap::new();
        for record in &records {
            *by_type
                .entry(record.provider_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(DnsProviderStats {
            total: records.len(),
            by_type,
        })
    }
}
