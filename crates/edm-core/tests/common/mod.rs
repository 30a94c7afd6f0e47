//! Small hand-written datamodel shared by the integration tests.

#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use edm_core::{
    Association, CollectionProvider, DatamodelModule, EdmResult, Link, ObjectID, RecordRef,
    Registry, Relations, Resolution, VectorMemberBuffer, VectorMembers, Version, lookup,
};
use smallvec::{SmallVec, smallvec};

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct HitData {
    pub energy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ClusterData {
    pub energy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TrackData {
    pub chi2: f32,
    pub ndf: u32,
}

/// A track points at the hit it was seeded from.
#[derive(Clone, Debug, Default)]
pub struct TrackRelations {
    pub seed: Option<RecordRef<Hit>>,
}

impl Relations for TrackRelations {
    const NAMES: &'static [&'static str] = &["seed"];

    fn target_ids(&self) -> SmallVec<[ObjectID; 4]> {
        smallvec![self.seed.as_ref().map_or(ObjectID::INVALID, RecordRef::id)]
    }

    fn resolve(
        &mut self,
        slot: usize,
        id: ObjectID,
        provider: &dyn CollectionProvider,
    ) -> Resolution {
        match slot {
            0 => lookup::<Hit>(provider, id).assign(&mut self.seed),
            _ => Resolution::Unset,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMembers {
    pub residuals: Vec<f32>,
    pub layers: Vec<u16>,
}

impl VectorMembers for TrackMembers {
    const NAMES: &'static [&'static str] = &["residuals", "layers"];

    fn allocate() -> Vec<VectorMemberBuffer> {
        vec![
            VectorMemberBuffer::new::<f32>("residuals"),
            VectorMemberBuffer::new::<u16>("layers"),
        ]
    }

    fn write_into(&self, buffers: &mut [VectorMemberBuffer]) -> EdmResult<()> {
        buffers[0].push_entry(&self.residuals)?;
        buffers[1].push_entry(&self.layers)
    }

    fn read_from(buffers: &[VectorMemberBuffer], index: usize) -> EdmResult<Self> {
        Ok(Self {
            residuals: buffers[0].entry::<f32>(index)?.to_vec(),
            layers: buffers[1].entry::<u16>(index)?.to_vec(),
        })
    }
}

edm_core::record! {
    /// A calorimeter hit.
    pub Hit { data: HitData, name: "Hit", version: 1 }
}

edm_core::record! {
    /// A cluster of hits.
    pub Cluster { data: ClusterData, name: "Cluster", version: 1 }
}

edm_core::record! {
    /// A fitted track.
    pub Track {
        data: TrackData,
        name: "Track",
        version: 1,
        relations: TrackRelations,
        members: TrackMembers,
    }
}

pub type HitClusterAssociation = Association<Hit, Cluster>;
pub type HitClusterLink = Link<Hit, Cluster>;

pub const DEFINITION: &str = r#"{
    "schema_version": 1,
    "datatypes": {
        "Hit": { "Members": ["float energy // deposited energy"] },
        "Cluster": { "Members": ["float energy // total energy"] },
        "Track": {
            "Members": ["float chi2", "uint32_t ndf"],
            "OneToOneRelations": ["Hit seed // seeding hit"],
            "VectorMembers": ["float residuals // fit residuals", "uint16_t layers // crossed layers"]
        }
    }
}"#;

pub struct Demo;

impl DatamodelModule for Demo {
    const NAME: &'static str = "demo";
    const DEFINITION: &'static str = DEFINITION;

    fn version() -> Option<Version> {
        Some(Version::new(1, 0, 0))
    }

    fn register_types(registry: &mut Registry) -> EdmResult<()> {
        registry.register_record::<Hit>()?;
        registry.register_record::<Cluster>()?;
        registry.register_record::<Track>()?;
        registry.register_record::<HitClusterAssociation>()?;
        registry.register_record::<HitClusterLink>()
    }
}

/// Registry with the demo datamodel registered.
pub fn registry() -> Registry {
    init_tracing();
    let mut registry = Registry::new();
    registry
        .register_module::<Demo>()
        .expect("demo datamodel registers");
    registry
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
