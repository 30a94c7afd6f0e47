//! Catalogue of loaded datamodels.
//!
//! Each datamodel module registers its JSON definition, its version and the
//! relation field names of its record types. Generic I/O code uses the
//! relation names to label per-type reference vectors without per-type code.

use std::{collections::hash_map::Entry, fmt, str::FromStr};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    Record,
    error::{EdmError, EdmResult},
    record::{Relations, VectorMembers},
};

/// Definition returned for datamodels that are not registered.
pub const EMPTY_DEFINITION: &str = "{}";

static NO_RELATIONS: RelationNames = RelationNames {
    one_to_one: Vec::new(),
    one_to_many: Vec::new(),
    vector_members: Vec::new(),
};

/// Relation and vector member field names of one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationNames {
    pub one_to_one: Vec<String>,
    pub one_to_many: Vec<String>,
    pub vector_members: Vec<String>,
}

impl RelationNames {
    /// Names declared by the record type `R`.
    #[must_use]
    pub fn of<R: Record>() -> Self {
        Self {
            one_to_one: R::Relations::NAMES.iter().map(ToString::to_string).collect(),
            one_to_many: Vec::new(),
            vector_members: R::Members::NAMES.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.one_to_one.is_empty() && self.one_to_many.is_empty() && self.vector_members.is_empty()
    }
}

/// Relation names per record type name.
pub type RelationNameMapping = FxHashMap<String, RelationNames>;

/// Datamodel version, `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = EdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EdmError::InvalidVersion(s.to_string());
        let mut parts = s.trim().split('.').map(str::parse::<u16>);

        let mut next = || parts.next().ok_or_else(invalid)?.map_err(|_| invalid());
        let version = Self::new(next()?, next()?, next()?);

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug)]
struct Datamodel {
    name: String,
    definition: String,
    version: Option<Version>,
}

/// Registry of datamodel definitions and relation names.
#[derive(Debug, Default)]
pub struct DatamodelRegistry {
    datamodels: Vec<Datamodel>,
    relations: RelationNameMapping,
}

impl DatamodelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a datamodel and return its index.
    ///
    /// Registering a name a second time returns the existing index and
    /// leaves the first registration in place. Relation names from the
    /// definition replace names derived from record types.
    pub fn register_datamodel(
        &mut self,
        name: impl Into<String>,
        definition: impl Into<String>,
        relations: RelationNameMapping,
        version: Option<Version>,
    ) -> usize {
        let name = name.into();
        if let Some(index) = self.index_of(&name) {
            return index;
        }

        self.relations.extend(relations);

        let index = self.datamodels.len();
        debug!(%name, index, version = ?version, "registered datamodel");
        self.datamodels.push(Datamodel {
            name,
            definition: definition.into(),
            version,
        });
        index
    }

    /// Record the relation names of `type_name` unless some are known already.
    ///
    /// Returns whether the names were recorded.
    pub fn register_relation_names(&mut self, type_name: impl Into<String>, names: RelationNames) -> bool {
        match self.relations.entry(type_name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                trace!(type_name = %slot.key(), "recorded relation names");
                slot.insert(names);
                true
            }
        }
    }

    /// Index of the datamodel called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.datamodels.iter().position(|dm| dm.name == name)
    }

    /// JSON definition of `name`, [`EMPTY_DEFINITION`] if unknown.
    #[must_use]
    pub fn datamodel_definition(&self, name: &str) -> &str {
        self.index_of(name)
            .map_or(EMPTY_DEFINITION, |index| self.datamodels[index].definition.as_str())
    }

    /// JSON definition at `index`, [`EMPTY_DEFINITION`] if out of range.
    #[must_use]
    pub fn datamodel_definition_at(&self, index: usize) -> &str {
        self.datamodels
            .get(index)
            .map_or(EMPTY_DEFINITION, |dm| dm.definition.as_str())
    }

    /// Name of the datamodel at `index`.
    #[must_use]
    pub fn datamodel_name(&self, index: usize) -> Option<&str> {
        self.datamodels.get(index).map(|dm| dm.name.as_str())
    }

    /// Version of `name`, if it was registered with one.
    #[must_use]
    pub fn datamodel_version(&self, name: &str) -> Option<Version> {
        self.index_of(name)
            .and_then(|index| self.datamodels[index].version)
    }

    /// Relation names of `type_name`; empty if the type is unknown.
    #[must_use]
    pub fn relation_names(&self, type_name: &str) -> &RelationNames {
        self.relations.get(type_name).unwrap_or(&NO_RELATIONS)
    }

    /// Names of all registered datamodels, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datamodels.iter().map(|dm| dm.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.datamodels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datamodels.is_empty()
    }
}

/// Derive relation names from a JSON datamodel definition.
///
/// Reads the `OneToOneRelations`, `OneToManyRelations` and `VectorMembers`
/// lists of every entry under `datatypes`. Each list item has the form
/// `"<type> <name> // <description>"`.
pub fn relation_names_from_definition(definition: &str) -> EdmResult<RelationNameMapping> {
    let root: Value = serde_json::from_str(definition)?;
    let mut mapping = RelationNameMapping::default();

    let Some(datatypes) = root.get("datatypes").and_then(Value::as_object) else {
        return Ok(mapping);
    };

    for (type_name, datatype) in datatypes {
        let names = RelationNames {
            one_to_one: field_names(datatype, "OneToOneRelations"),
            one_to_many: field_names(datatype, "OneToManyRelations"),
            vector_members: field_names(datatype, "VectorMembers"),
        };
        mapping.insert(type_name.clone(), names);
    }
    Ok(mapping)
}

fn field_names(datatype: &Value, key: &str) -> Vec<String> {
    datatype
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|item| {
            let declaration = item.split("//").next().unwrap_or_default();
            declaration.split_whitespace().nth(1).map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"{
        "schema_version": 2,
        "datatypes": {
            "Cluster": {
                "Members": ["float energy // total energy"],
                "OneToManyRelations": ["Hit hits // constituent hits"],
                "VectorMembers": ["float shape // shape parameters"]
            },
            "Hit": {
                "Members": ["float energy"]
            },
            "Track": {
                "OneToOneRelations": ["Vertex origin // production vertex", "Vertex end"]
            }
        }
    }"#;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = DatamodelRegistry::new();
        let first = registry.register_datamodel("tracking", "{\"a\":1}", RelationNameMapping::default(), None);
        let second = registry.register_datamodel("tracking", "{\"b\":2}", RelationNameMapping::default(), None);
        let other = registry.register_datamodel("calo", "{}", RelationNameMapping::default(), Some(Version::new(1, 2, 0)));

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.datamodel_definition("tracking"), "{\"a\":1}");
        assert_eq!(registry.datamodel_definition_at(other), "{}");
        assert_eq!(registry.datamodel_name(other), Some("calo"));
        assert_eq!(registry.datamodel_version("calo"), Some(Version::new(1, 2, 0)));
        assert_eq!(registry.datamodel_version("tracking"), None);
    }

    #[test]
    fn test_definition_names_win_over_derived_names() {
        let mut registry = DatamodelRegistry::new();
        let derived = RelationNames {
            one_to_one: vec!["origin".into()],
            ..RelationNames::default()
        };
        assert!(registry.register_relation_names("Track", derived.clone()));
        assert!(registry.register_relation_names("Vertex", derived.clone()));
        assert!(!registry.register_relation_names("Track", RelationNames::default()));
        assert_eq!(registry.relation_names("Track"), &derived);

        let mapping = relation_names_from_definition(DEFINITION).unwrap();
        registry.register_datamodel("demo", DEFINITION, mapping, None);
        assert_eq!(registry.relation_names("Track").one_to_one, vec!["origin", "end"]);
        assert_eq!(registry.relation_names("Vertex"), &derived);
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = DatamodelRegistry::new();
        assert_eq!(registry.datamodel_definition("missing"), EMPTY_DEFINITION);
        assert_eq!(registry.datamodel_definition_at(4), EMPTY_DEFINITION);
        assert!(registry.relation_names("Missing").is_empty());
        assert!(registry.datamodel_version("missing").is_none());
    }

    #[test]
    fn test_relation_names_from_definition() {
        let mapping = relation_names_from_definition(DEFINITION).unwrap();
        assert_eq!(mapping["Track"].one_to_one, vec!["origin", "end"]);
        assert_eq!(mapping["Cluster"].one_to_many, vec!["hits"]);
        assert_eq!(mapping["Cluster"].vector_members, vec!["shape"]);
        assert!(mapping["Hit"].is_empty());

        let mut registry = DatamodelRegistry::new();
        registry.register_datamodel("demo", DEFINITION, mapping, None);
        assert_eq!(registry.relation_names("Track").one_to_one.len(), 2);
    }

    #[test]
    fn test_malformed_definition() {
        let err = relation_names_from_definition("{ not json").unwrap_err();
        assert!(matches!(err, EdmError::Json(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }

    #[test]
    fn test_version_parse() {
        let version: Version = "2.10.1".parse().unwrap();
        assert_eq!(version, Version::new(2, 10, 1));
        assert_eq!(version.to_string(), "2.10.1");
        assert!(Version::new(1, 2, 3) < Version::new(1, 10, 0));

        for bad in ["", "1.2", "1.2.3.4", "a.b.c", "1.-2.3"] {
            assert!(matches!(
                bad.parse::<Version>(),
                Err(EdmError::InvalidVersion(_))
            ));
        }
    }
}
