//! Per-key accessor policy.
//!
//! Reads one top-level key from the store on every call. There is no local
//! cache and no type tag; the value is parsed as whatever the caller asks for.
//! Use [`FeatureToggle`](crate::FeatureToggle) unless a flag lives outside
//! a namespace hash.

use crate::accessor::{AccessError, or_default, parse_bool, parse_number};
use crate::store::StoreConnector;
use std::sync::Arc;

#[derive(Clone)]
pub struct DirectFlags {
    connector: Arc<dyn StoreConnector>,
}

impl DirectFlags {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        DirectFlags { connector }
    }

    async fn fetch(&self, key: &str) -> Result<String, AccessError> {
        let value = match self.connector.get_one(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return Err(AccessError::MissingKey),
            Err(e) => return Err(AccessError::Unavailable(e.to_string())),
        };

        if value.trim().is_empty() {
            return Err(AccessError::EmptyValue);
        }
        Ok(value)
    }

    pub async fn is_enabled(&self, key: &str, default: bool) -> bool {
        let result = self.fetch(key).await.and_then(|v| parse_bool(&v));
        or_default("direct_is_enabled", key, result, default)
    }

    pub async fn get_string(&self, key: &str, default: String) -> String {
        let result = self.fetch(key).await;
        or_default("direct_get_string", key, result, default)
    }

    pub async fn get_number(&self, key: &str, default: f64) -> f64 {
        let result = self.fetch(key).await.and_then(|v| parse_number(&v));
        or_default("direct_get_number", key, result, default)
    }
}
