//! Lineage provider registry
//!
//! Mirror of the data-source registry: a write-once table of provider
//! definitions and factories keyed by `LineageProviderType`.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{
    LineageCapabilities, LineageProviderInfo, LineageProviderType,
};

use super::openlineage::OpenLineageAdapter;
use super::static_sql::{SqlDefinition, StaticSqlLineageAdapter};
use super::{LineageAdapter, LineageError};

type ProviderFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn LineageAdapter>, LineageError> + Send + Sync>;

struct RegistryEntry {
    info: LineageProviderInfo,
    factory: ProviderFactory,
}

/// Registry of lineage providers by type
pub struct LineageRegistry {
    entries: HashMap<LineageProviderType, RegistryEntry>,
}

impl LineageRegistry {
    fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    fn register(&mut self, info: LineageProviderInfo, factory: ProviderFactory) {
        self.entries.insert(info.provider, RegistryEntry { info, factory });
    }

    /// Instantiate a provider from its config map
    pub fn create(
        &self,
        provider: LineageProviderType,
        config: &serde_json::Value,
    ) -> Result<Arc<dyn LineageAdapter>, LineageError> {
        let entry = self.entries.get(&provider).ok_or_else(|| {
            LineageError::Config(format!("no provider registered for {}", provider.as_str()))
        })?;
        (entry.factory)(config)
    }

    pub fn info(&self, provider: LineageProviderType) -> Option<&LineageProviderInfo> {
        self.entries.get(&provider).map(|e| &e.info)
    }

    pub fn providers(&self) -> Vec<&LineageProviderInfo> {
        let mut infos: Vec<&LineageProviderInfo> =
            self.entries.values().map(|e| &e.info).collect();
        infos.sort_by_key(|i| i.provider.as_str());
        infos
    }

    pub fn is_registered(&self, provider: LineageProviderType) -> bool {
        self.entries.contains_key(&provider)
    }
}

fn static_sql_from_config(
    config: &serde_json::Value,
) -> Result<Arc<dyn LineageAdapter>, LineageError> {
    let platform = config
        .get("platform")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let definitions = config
        .get("definitions")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?.to_string();
                    let sql = item.get("sql")?.as_str()?.to_string();
                    Some(SqlDefinition { name, sql })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Ok(Arc::new(StaticSqlLineageAdapter::new(platform, definitions)))
}

/// The process-wide lineage registry, built once at first use.
pub fn lineage_registry() -> &'static LineageRegistry {
    static REGISTRY: Lazy<LineageRegistry> = Lazy::new(|| {
        let mut registry = LineageRegistry::empty();

        registry.register(
            LineageProviderInfo {
                provider: LineageProviderType::StaticSql,
                display_name: "Static SQL".to_string(),
                description: "Lineage parsed from SQL definitions".to_string(),
                capabilities: LineageCapabilities {
                    supports_column_lineage: true,
                    supports_search: true,
                    ..LineageCapabilities::default()
                },
            },
            Box::new(static_sql_from_config),
        );

        registry.register(
            LineageProviderInfo {
                provider: LineageProviderType::Openlineage,
                display_name: "OpenLineage".to_string(),
                description: "Lineage from an OpenLineage/Marquez API".to_string(),
                capabilities: LineageCapabilities {
                    supports_job_runs: true,
                    supports_freshness: true,
                    supports_search: true,
                    supports_tags: true,
                    is_realtime: true,
                    ..LineageCapabilities::default()
                },
            },
            Box::new(|config| Ok(Arc::new(OpenLineageAdapter::from_config(config)?))),
        );

        registry
    });
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_providers_registered() {
        let registry = lineage_registry();
        assert!(registry.is_registered(LineageProviderType::StaticSql));
        assert!(registry.is_registered(LineageProviderType::Openlineage));
        assert!(!registry.is_registered(LineageProviderType::Dbt));
    }

    #[test]
    fn static_sql_provider_builds_from_config() {
        let config = serde_json::json!({
            "platform": "postgres",
            "definitions": [
                {"name": "m1", "sql": "CREATE TABLE a AS SELECT * FROM b"},
            ],
        });
        let provider = lineage_registry()
            .create(LineageProviderType::StaticSql, &config)
            .unwrap();
        assert_eq!(provider.provider_info().provider, LineageProviderType::StaticSql);
    }

    #[test]
    fn unknown_provider_errors() {
        let err = lineage_registry()
            .create(LineageProviderType::Datahub, &serde_json::json!({}))
            .err();
        assert!(err.is_some());
    }
}
