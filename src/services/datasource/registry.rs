//! Data-source adapter registry
//!
//! Process-wide map of `SourceType` to adapter factory plus its
//! self-describing definition. Built once at first use from an explicit
//! registration table and read-only afterwards, so no lock sits on the
//! lookup path.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{SourceType, SourceTypeDefinition};

use super::filesystem::LocalFileAdapter;
use super::mysql::MySqlAdapter;
use super::sqlite::SqliteAdapter;
use super::{
    AdapterError, AdapterResult, ApiAdapter, DataSourceAdapter, DocumentAdapter, FileAdapter,
    SqlAdapter,
};

/// A live adapter, tagged with the shape its source speaks
#[derive(Clone)]
pub enum AdapterInstance {
    Sql(Arc<dyn SqlAdapter>),
    Document(Arc<dyn DocumentAdapter>),
    Api(Arc<dyn ApiAdapter>),
    File(Arc<dyn FileAdapter>),
}

impl AdapterInstance {
    /// The shape-independent contract
    pub fn as_base(&self) -> &dyn DataSourceAdapter {
        match self {
            Self::Sql(a) => a.as_ref(),
            Self::Document(a) => a.as_ref(),
            Self::Api(a) => a.as_ref(),
            Self::File(a) => a.as_ref(),
        }
    }

    /// SQL surface, when the source speaks SQL
    pub fn as_sql(&self) -> Option<Arc<dyn SqlAdapter>> {
        match self {
            Self::Sql(a) => Some(Arc::clone(a)),
            _ => None,
        }
    }
}

type AdapterFactory =
    Box<dyn Fn(&serde_json::Value) -> AdapterResult<AdapterInstance> + Send + Sync>;

struct RegistryEntry {
    definition: SourceTypeDefinition,
    factory: AdapterFactory,
}

/// Registry of adapter implementations by source type
pub struct AdapterRegistry {
    entries: HashMap<SourceType, RegistryEntry>,
}

impl AdapterRegistry {
    fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    fn register(
        &mut self,
        definition: SourceTypeDefinition,
        factory: AdapterFactory,
    ) {
        self.entries.insert(definition.source_type, RegistryEntry { definition, factory });
    }

    /// Instantiate an adapter for a source type from its config map
    pub fn create(
        &self,
        source_type: SourceType,
        config: &serde_json::Value,
    ) -> AdapterResult<AdapterInstance> {
        let entry = self.entries.get(&source_type).ok_or_else(|| {
            AdapterError::invalid_config(format!(
                "No adapter registered for source type: {}",
                source_type.as_str()
            ))
        })?;
        (entry.factory)(config)
    }

    /// Definition for one source type, for UI forms
    pub fn definition(&self, source_type: SourceType) -> Option<&SourceTypeDefinition> {
        self.entries.get(&source_type).map(|e| &e.definition)
    }

    /// All registered definitions
    pub fn definitions(&self) -> Vec<&SourceTypeDefinition> {
        let mut defs: Vec<&SourceTypeDefinition> =
            self.entries.values().map(|e| &e.definition).collect();
        defs.sort_by_key(|d| d.source_type.as_str());
        defs
    }

    pub fn is_registered(&self, source_type: SourceType) -> bool {
        self.entries.contains_key(&source_type)
    }
}

/// The process-wide registry, built once.
///
/// Registration is an explicit table rather than scattered side effects:
/// every adapter the build knows about is listed here.
pub fn adapter_registry() -> &'static AdapterRegistry {
    static REGISTRY: Lazy<AdapterRegistry> = Lazy::new(|| {
        let mut registry = AdapterRegistry::empty();

        registry.register(
            MySqlAdapter::definition(),
            Box::new(|config| Ok(AdapterInstance::Sql(Arc::new(MySqlAdapter::from_config(config)?)))),
        );
        registry.register(
            SqliteAdapter::definition(),
            Box::new(|config| Ok(AdapterInstance::Sql(Arc::new(SqliteAdapter::from_config(config)?)))),
        );
        registry.register(
            LocalFileAdapter::definition(),
            Box::new(|config| {
                Ok(AdapterInstance::File(Arc::new(LocalFileAdapter::from_config(config)?)))
            }),
        );

        registry
    });
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceCategory;

    #[test]
    fn builtin_adapters_are_registered() {
        let registry = adapter_registry();
        assert!(registry.is_registered(SourceType::Mysql));
        assert!(registry.is_registered(SourceType::Sqlite));
        assert!(registry.is_registered(SourceType::LocalFile));
    }

    #[test]
    fn definitions_carry_derived_categories() {
        let registry = adapter_registry();
        let mysql = registry.definition(SourceType::Mysql).unwrap();
        assert_eq!(mysql.category, SourceCategory::Database);
        assert_eq!(mysql.category, SourceType::Mysql.category());

        let file = registry.definition(SourceType::LocalFile).unwrap();
        assert_eq!(file.category, SourceCategory::Filesystem);
    }

    #[test]
    fn no_registered_adapter_supports_write() {
        for def in adapter_registry().definitions() {
            assert!(!def.capabilities.supports_write, "{}", def.source_type.as_str());
        }
    }

    #[test]
    fn unknown_source_type_errors() {
        let err = adapter_registry()
            .create(SourceType::Snowflake, &serde_json::json!({}))
            .err()
            .unwrap();
        assert_eq!(err.code, crate::services::datasource::ErrorCode::InvalidConfig);
    }
}
