//! Serializer and importation plan catalog.
//!
//! The [`Catalog`] maps names to [`Serializer`]s and [`ImportationPlan`]s.
//! It is explicitly constructed and handed to each
//! [`Migration`](crate::orchestrator::Migration) instead of living in a
//! global registry, so tests can build catalogs with custom entries.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::plans::{
    BulkCreatePlan, CreatePlan, DirectPlan, ImportationPlan, ReplaceAllPlan, ReplacePlan,
    UpdateOrCreatePlan, UpdatePlan,
};
use crate::serializers::{CsvSerializer, JsonSerializer, Serializer, YamlSerializer};

/// Registry of serializers and importation plans keyed by name.
///
/// # Example
///
/// ```rust
/// use record_migrate::core::Catalog;
///
/// let catalog = Catalog::with_builtins();
/// assert!(catalog.has_serializer("tsv"));
/// assert_eq!(catalog.require_plan("replace")?.name(), "replace");
/// assert!(catalog.require_serializer("xml").is_err());
/// # Ok::<(), record_migrate::MigrateError>(())
/// ```
#[derive(Default)]
pub struct Catalog {
    /// Registered serializers by name.
    serializers: HashMap<String, Arc<dyn Serializer>>,

    /// Registered importation plans by name.
    plans: HashMap<String, Arc<dyn ImportationPlan>>,
}

impl Catalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the standard serializers and every importation
    /// plan registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog.register_serializer(CsvSerializer::new());
        catalog.register_serializer(CsvSerializer::tsv());
        catalog.register_serializer(JsonSerializer::new());
        catalog.register_serializer(YamlSerializer::new());

        catalog.register_plans();
        catalog
    }

    /// Create a catalog whose serializers carry the configured parameters.
    pub fn from_config(config: &Config) -> Self {
        let mut catalog = Self::new();

        let csv = config.csv.serializer();
        let tsv = csv.clone().with_name("tsv").with_delimiter(b'\t');
        catalog.register_serializer(csv);
        catalog.register_serializer(tsv);
        catalog.register_serializer(
            JsonSerializer::new()
                .with_indent(config.json.indent.clone())
                .with_none_replacement(config.json.none_replacement.clone()),
        );
        catalog.register_serializer(YamlSerializer::new());

        catalog.register_plans();
        catalog
    }

    fn register_plans(&mut self) {
        self.register_plan(DirectPlan);
        self.register_plan(CreatePlan);
        self.register_plan(BulkCreatePlan);
        self.register_plan(UpdatePlan);
        self.register_plan(UpdateOrCreatePlan::new());
        self.register_plan(UpdateOrCreatePlan::bulk());
        self.register_plan(ReplacePlan);
        self.register_plan(ReplaceAllPlan);
    }

    /// Register a serializer under its own name.
    pub fn register_serializer(&mut self, serializer: impl Serializer + 'static) {
        self.register_serializer_arc(Arc::new(serializer));
    }

    /// Register a shared serializer under its own name.
    pub fn register_serializer_arc(&mut self, serializer: Arc<dyn Serializer>) {
        debug!("Registering serializer {}", serializer.name());
        self.serializers
            .insert(serializer.name().to_string(), serializer);
    }

    /// Register an importation plan under its own name.
    pub fn register_plan(&mut self, plan: impl ImportationPlan + 'static) {
        debug!("Registering importation plan {}", plan.name());
        self.plans.insert(plan.name().to_string(), Arc::new(plan));
    }

    /// Get a serializer by name.
    pub fn get_serializer(&self, name: &str) -> Option<Arc<dyn Serializer>> {
        self.serializers.get(name).cloned()
    }

    /// Get a serializer by name, returning an error if not found.
    pub fn require_serializer(&self, name: &str) -> Result<Arc<dyn Serializer>> {
        self.get_serializer(name)
            .ok_or_else(|| MigrateError::UnknownSerializer(name.to_string()))
    }

    /// Get an importation plan by name.
    pub fn get_plan(&self, name: &str) -> Option<Arc<dyn ImportationPlan>> {
        self.plans.get(name).cloned()
    }

    /// Get an importation plan by name, returning an error if not found.
    pub fn require_plan(&self, name: &str) -> Result<Arc<dyn ImportationPlan>> {
        self.get_plan(name)
            .ok_or_else(|| MigrateError::UnknownPlan(name.to_string()))
    }

    pub fn has_serializer(&self, name: &str) -> bool {
        self.serializers.contains_key(name)
    }

    pub fn has_plan(&self, name: &str) -> bool {
        self.plans.contains_key(name)
    }

    /// Registered serializer names, sorted.
    pub fn serializer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.serializers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered plan names, sorted.
    pub fn plan_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plans.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("serializers", &self.serializer_names())
            .field("plans", &self.plan_names())
            .finish()
    }
}
