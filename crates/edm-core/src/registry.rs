//! Process-wide registration context.
//!
//! A [`Registry`] bundles the buffer factory, schema evolution, datamodel
//! catalogue and configuration. Datamodel modules register into it
//! explicitly at startup; readers and writers receive it by reference.
//! A fully populated registry can additionally be installed once as the
//! process-wide instance.
//!
//! ```ignore
//! let mut registry = Registry::from_env();
//! registry.register_module::<TrackingModel>()?;
//! let raw = registry.write_collection(&hits)?;
//! let hits = registry.read_collection(&raw)?;
//! ```

use std::sync::OnceLock;

use tracing::{debug, trace, warn};

use crate::{
    EdmConfig, Record,
    buffers::RawCollection,
    collection::CollectionBase,
    datamodel::{DatamodelRegistry, RelationNames, Version, relation_names_from_definition},
    error::{EdmError, EdmResult},
    evolution::SchemaEvolution,
    factory::BufferFactory,
};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// A datamodel: its definition and the record types it declares.
pub trait DatamodelModule {
    /// Datamodel name; registration is idempotent by name.
    const NAME: &'static str;
    /// JSON definition of the datamodel.
    const DEFINITION: &'static str;

    fn version() -> Option<Version> {
        None
    }

    /// Register every record type and evolution step of the datamodel.
    fn register_types(registry: &mut Registry) -> EdmResult<()>;
}

/// Buffer factory, schema evolution and datamodel catalogue of a process.
#[derive(Debug, Default)]
pub struct Registry {
    buffers: BufferFactory,
    evolution: SchemaEvolution,
    datamodels: DatamodelRegistry,
    config: EdmConfig,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry using `config`.
    #[must_use]
    pub fn with_config(config: EdmConfig) -> Self {
        let mut registry = Self::default();
        registry.set_config(config);
        registry
    }

    /// Empty registry configured from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(EdmConfig::from_env())
    }

    #[must_use]
    pub const fn config(&self) -> &EdmConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EdmConfig) {
        self.evolution.set_policy(config.missing_evolution);
        self.config = config;
    }

    #[must_use]
    pub const fn buffers(&self) -> &BufferFactory {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut BufferFactory {
        &mut self.buffers
    }

    #[must_use]
    pub const fn evolution(&self) -> &SchemaEvolution {
        &self.evolution
    }

    pub fn evolution_mut(&mut self) -> &mut SchemaEvolution {
        &mut self.evolution
    }

    #[must_use]
    pub const fn datamodels(&self) -> &DatamodelRegistry {
        &self.datamodels
    }

    pub fn datamodels_mut(&mut self) -> &mut DatamodelRegistry {
        &mut self.datamodels
    }

    /// Register the current layout, schema version and relation names of `R`.
    ///
    /// Relation names already known for the type, e.g. from a datamodel
    /// definition, are kept.
    pub fn register_record<R: Record>(&mut self) -> EdmResult<()> {
        self.buffers.register_record::<R>()?;
        self.evolution
            .register_current_version(R::collection_type_name(), R::SCHEMA_VERSION)?;
        self.datamodels
            .register_relation_names(R::type_name(), RelationNames::of::<R>());
        Ok(())
    }

    /// Register a datamodel module and return its datamodel index.
    ///
    /// A module whose name is already registered is not registered again.
    pub fn register_module<M: DatamodelModule>(&mut self) -> EdmResult<usize> {
        if let Some(index) = self.datamodels.index_of(M::NAME) {
            return Ok(index);
        }

        let relations = relation_names_from_definition(M::DEFINITION)?;
        M::register_types(self)?;
        let index = self
            .datamodels
            .register_datamodel(M::NAME, M::DEFINITION, relations, M::version());

        debug!(datamodel = M::NAME, index, "registered datamodel module");
        Ok(index)
    }

    /// Install this registry as the process-wide instance.
    ///
    /// Only the first installation succeeds; later ones get their registry
    /// back.
    pub fn install_global(self) -> Result<&'static Self, Self> {
        let mut candidate = Some(self);
        let installed = GLOBAL.get_or_init(|| candidate.take().unwrap_or_default());
        match candidate {
            None => Ok(installed),
            Some(rejected) => Err(rejected),
        }
    }

    /// The process-wide instance, if installed.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// Flatten `collection` and return its byte image.
    pub fn write_collection(&self, collection: &dyn CollectionBase) -> EdmResult<RawCollection> {
        let type_name = collection.type_name();
        let id = collection
            .id()
            .ok_or_else(|| EdmError::MissingCollectionId(type_name.to_string()))?;

        if !self.buffers.contains(&type_name) {
            warn!(%type_name, "writing a collection type without registered buffers");
        }

        let raw = collection.prepare_for_write().to_raw(id);
        trace!(%type_name, id, records = collection.len(), "wrote collection");
        Ok(raw)
    }

    /// Rebuild a collection from its byte image.
    ///
    /// Allocates buffers for the stored layout, fills them, evolves them to
    /// the current layout and rehydrates the records. Relations stay
    /// unresolved until the caller runs
    /// [`set_references`](CollectionBase::set_references) with all sibling
    /// collections available.
    ///
    /// Returns `Ok(None)` for layouts the buffer factory does not know,
    /// unless unknown buffers are configured as strict.
    pub fn read_collection(&self, raw: &RawCollection) -> EdmResult<Option<Box<dyn CollectionBase>>> {
        let Some(mut buffers) =
            self.buffers
                .create_buffers(&raw.type_name, raw.schema_version, raw.is_subset)
        else {
            let err = EdmError::UnknownBuffers {
                type_name: raw.type_name.clone(),
                version: raw.schema_version,
            };
            if self.config.unknown_buffers.is_strict() {
                return Err(err);
            }
            warn!(%err, "skipping collection");
            return Ok(None);
        };

        buffers.fill_from_raw(raw, self.config.unknown_buffers)?;

        // Subset collections only hold addresses; their layout never changes.
        let (buffers, version) = if raw.is_subset {
            let current = self
                .evolution
                .current_version(&raw.type_name)
                .or_else(|| self.buffers.latest_version(&raw.type_name))
                .unwrap_or(raw.schema_version);
            (buffers, current)
        } else {
            let evolved = self
                .evolution
                .evolve_buffers(buffers, raw.schema_version, &raw.type_name)?;
            let version = evolved.schema_version;
            (evolved, version)
        };

        let creator = self.buffers.creator(&raw.type_name, version).ok_or_else(|| {
            EdmError::UnknownBuffers {
                type_name: raw.type_name.clone(),
                version,
            }
        })?;

        let mut collection = creator.create_collection(buffers)?;
        collection.set_degrade_policy(self.config.unresolved_references);
        collection.set_id(raw.collection_id)?;
        collection.prepare_after_read()?;

        trace!(
            type_name = %raw.type_name,
            id = raw.collection_id,
            records = collection.len(),
            "read collection"
        );
        Ok(Some(collection))
    }
}
