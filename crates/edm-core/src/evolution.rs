//! Schema evolution of collection buffers.
//!
//! Each collection type declares the schema version this build writes. For
//! every older version still found on disk a single step converts buffers
//! of that layout directly to the current one; steps are not chained.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::{
    DegradePolicy, SchemaVersion,
    buffers::CollectionBuffers,
    error::{EdmError, EdmResult},
};

/// Who provided an evolution step.
///
/// A user-defined step is never replaced by an auto-generated one; later
/// auto-generated steps replace earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    AutoGenerated,
    UserDefined,
}

/// Converts buffers of a stored layout to the current layout.
///
/// Receives the buffers and the version they were written with.
pub type EvolutionFn = Arc<dyn Fn(CollectionBuffers, SchemaVersion) -> CollectionBuffers + Send + Sync>;

/// The identity step, for versions whose layout did not change.
#[must_use]
pub fn no_schema_evolution() -> EvolutionFn {
    Arc::new(|buffers: CollectionBuffers, _: SchemaVersion| buffers)
}

struct Step {
    func: EvolutionFn,
    priority: Priority,
}

#[derive(Default)]
struct TypeEvolution {
    current: Option<SchemaVersion>,
    steps: FxHashMap<SchemaVersion, Step>,
}

/// Registry of evolution steps, keyed by collection type name.
#[derive(Default)]
pub struct SchemaEvolution {
    types: FxHashMap<String, TypeEvolution>,
    policy: DegradePolicy,
}

impl SchemaEvolution {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How missing steps are reported.
    pub fn set_policy(&mut self, policy: DegradePolicy) {
        self.policy = policy;
    }

    /// Declare the version this build writes for `type_name`.
    pub fn register_current_version(
        &mut self,
        type_name: impl Into<String>,
        version: SchemaVersion,
    ) -> EdmResult<()> {
        let type_name = type_name.into();
        if version == 0 {
            return Err(EdmError::InvalidSchemaVersion(type_name));
        }
        debug!(%type_name, version, "registered current schema version");
        self.types.entry(type_name).or_default().current = Some(version);
        Ok(())
    }

    /// Install the step converting `from_version` buffers of `type_name`.
    ///
    /// Returns `false` if an existing user-defined step was kept.
    pub fn register_evolution_func(
        &mut self,
        type_name: impl Into<String>,
        from_version: SchemaVersion,
        func: impl Fn(CollectionBuffers, SchemaVersion) -> CollectionBuffers + Send + Sync + 'static,
        priority: Priority,
    ) -> EdmResult<bool> {
        self.register_step(type_name.into(), from_version, Arc::new(func), priority)
    }

    /// Like [`register_evolution_func`](Self::register_evolution_func) for a shared step.
    pub fn register_step(
        &mut self,
        type_name: String,
        from_version: SchemaVersion,
        func: EvolutionFn,
        priority: Priority,
    ) -> EdmResult<bool> {
        if from_version == 0 {
            return Err(EdmError::InvalidSchemaVersion(type_name));
        }

        let steps = &mut self.types.entry(type_name.clone()).or_default().steps;
        if let Some(existing) = steps.get(&from_version) {
            if existing.priority > priority {
                debug!(
                    %type_name,
                    from_version,
                    "keeping user-defined evolution step"
                );
                return Ok(false);
            }
        }

        steps.insert(from_version, Step { func, priority });
        debug!(%type_name, from_version, ?priority, "registered evolution step");
        Ok(true)
    }

    /// Version this build writes for `type_name`.
    #[must_use]
    pub fn current_version(&self, type_name: &str) -> Option<SchemaVersion> {
        self.types.get(type_name)?.current
    }

    /// Whether a step from `from_version` is registered.
    #[must_use]
    pub fn has_step(&self, type_name: &str, from_version: SchemaVersion) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|evolution| evolution.steps.contains_key(&from_version))
    }

    /// Convert `buffers` written with `from_version` to the current layout.
    ///
    /// Buffers already at the current version are returned untouched. If
    /// no step exists the buffers are returned unevolved with a warning, or
    /// an error in strict mode.
    pub fn evolve_buffers(
        &self,
        buffers: CollectionBuffers,
        from_version: SchemaVersion,
        type_name: &str,
    ) -> EdmResult<CollectionBuffers> {
        let Some(evolution) = self.types.get(type_name) else {
            return self.degrade(buffers, EdmError::UnknownSchema(type_name.to_string()));
        };
        let Some(current) = evolution.current else {
            return self.degrade(buffers, EdmError::UnknownSchema(type_name.to_string()));
        };
        if from_version == current {
            return Ok(buffers);
        }

        let Some(step) = evolution.steps.get(&from_version) else {
            return self.degrade(
                buffers,
                EdmError::MissingEvolution {
                    type_name: type_name.to_string(),
                    from: from_version,
                    current,
                },
            );
        };

        trace!(type_name, from_version, current, "evolving buffers");
        let mut evolved = (step.func)(buffers, from_version);
        evolved.schema_version = current;
        Ok(evolved)
    }

    fn degrade(&self, buffers: CollectionBuffers, err: EdmError) -> EdmResult<CollectionBuffers> {
        if self.policy.is_strict() {
            return Err(err);
        }
        warn!(%err, "returning buffers unevolved");
        Ok(buffers)
    }
}

impl fmt::Debug for SchemaEvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.types.iter().map(|(name, evolution)| {
                let mut from: Vec<_> = evolution.steps.keys().copied().collect();
                from.sort_unstable();
                (name, (evolution.current, from))
            }))
            .finish()
    }
}
