//! Flat, type-erased images of a collection.
//!
//! [`CollectionBuffers`] is what a collection hands to a backend when it is
//! written and what the backend hands back when it is read: one POD payload
//! buffer, one vector of [`ObjectID`]s per relation slot and one
//! [`VectorMemberBuffer`] per vector member. Payload buffers are
//! type-erased behind [`DataBuffer`] so the factory and schema evolution can
//! move them around without knowing the payload type.
//!
//! [`RawCollection`] is the byte-level view of the same buffers, the hand-off
//! object for storage backends.

use std::{any::Any, fmt};

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    DegradePolicy, ObjectID, Record, SchemaVersion,
    error::{EdmError, EdmResult},
    record::{Relations, VectorMembers},
};

/// Type-erased growable buffer of POD elements.
pub trait DataBuffer: Any + Send + Sync {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of one element in bytes.
    fn element_size(&self) -> usize;

    /// Name of the element type.
    fn element_type(&self) -> &'static str;

    /// Raw bytes of all elements.
    fn as_bytes(&self) -> &[u8];

    /// Append elements decoded from `bytes`.
    fn extend_from_bytes(&mut self, bytes: &[u8]) -> EdmResult<()>;

    /// Remove all elements.
    fn clear(&mut self);

    /// Deep copy.
    fn clone_buffer(&self) -> Box<dyn DataBuffer>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<D: Pod + Send + Sync> DataBuffer for Vec<D> {
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }

    #[inline]
    fn element_size(&self) -> usize {
        size_of::<D>()
    }

    fn element_type(&self) -> &'static str {
        std::any::type_name::<D>()
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    fn extend_from_bytes(&mut self, bytes: &[u8]) -> EdmResult<()> {
        let element_size = size_of::<D>();
        if element_size == 0 {
            return Ok(());
        }
        if bytes.len() % element_size != 0 {
            return Err(EdmError::BufferSize {
                len: bytes.len(),
                element_size,
            });
        }

        self.reserve(bytes.len() / element_size);
        self.extend(
            bytes
                .chunks_exact(element_size)
                .map(bytemuck::pod_read_unaligned::<D>),
        );
        Ok(())
    }

    #[inline]
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn clone_buffer(&self) -> Box<dyn DataBuffer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl fmt::Debug for dyn DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBuffer")
            .field("element", &self.element_type())
            .field("len", &self.len())
            .finish()
    }
}

/// Flattened variable-length member of every record in a collection.
///
/// The values of all records are concatenated; `offsets[i]..offsets[i + 1]`
/// is the slice belonging to record `i`.
pub struct VectorMemberBuffer {
    name: String,
    values: Box<dyn DataBuffer>,
    offsets: Vec<u32>,
}

impl VectorMemberBuffer {
    /// Empty buffer for elements of type `T`.
    #[must_use]
    pub fn new<T: Pod + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Box::new(Vec::<T>::new()),
            offsets: vec![0],
        }
    }

    /// Member name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored entries (records).
    #[inline]
    #[must_use]
    pub fn entries(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Entry boundaries, starting with 0.
    #[inline]
    #[must_use]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// The concatenated values.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &dyn DataBuffer {
        &*self.values
    }

    /// Append one entry.
    pub fn push_entry<T: Pod + Send + Sync>(&mut self, entry: &[T]) -> EdmResult<()> {
        let values = self.typed_mut::<T>()?;
        values.extend_from_slice(entry);
        let end = values.len() as u32;
        self.offsets.push(end);
        Ok(())
    }

    /// Values of entry `index`.
    pub fn entry<T: Pod + Send + Sync>(&self, index: usize) -> EdmResult<&[T]> {
        let values = self.typed::<T>()?;
        let range = self
            .offsets
            .get(index)
            .zip(self.offsets.get(index + 1))
            .map(|(&start, &end)| start as usize..end as usize)
            .ok_or_else(|| EdmError::VectorMemberIndex {
                name: self.name.clone(),
                index,
            })?;
        values
            .get(range)
            .ok_or_else(|| EdmError::InvalidOffsets(self.name.clone()))
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.values.clear();
        self.offsets.clear();
        self.offsets.push(0);
    }

    /// Replace the contents with a byte image.
    pub fn fill_from_raw(&mut self, raw: &RawVectorMember) -> EdmResult<()> {
        self.clear();
        self.values.extend_from_bytes(&raw.values)?;

        let valid = raw.offsets.first() == Some(&0)
            && raw.offsets.windows(2).all(|w| w[0] <= w[1])
            && raw
                .offsets
                .last()
                .is_some_and(|&end| end as usize == self.values.len());
        if !valid {
            self.clear();
            return Err(EdmError::InvalidOffsets(self.name.clone()));
        }

        self.offsets.clone_from(&raw.offsets);
        Ok(())
    }

    /// Byte image of this buffer.
    #[must_use]
    pub fn to_raw(&self) -> RawVectorMember {
        RawVectorMember {
            name: self.name.clone(),
            values: self.values.as_bytes().to_vec(),
            offsets: self.offsets.clone(),
        }
    }

    fn typed<T: Pod + Send + Sync>(&self) -> EdmResult<&Vec<T>> {
        self.values
            .as_any()
            .downcast_ref::<Vec<T>>()
            .ok_or_else(|| self.mismatch::<T>())
    }

    fn typed_mut<T: Pod + Send + Sync>(&mut self) -> EdmResult<&mut Vec<T>> {
        let name = &self.name;
        self.values
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .ok_or_else(|| EdmError::LayoutMismatch {
                type_name: name.clone(),
                expected: std::any::type_name::<T>(),
            })
    }

    fn mismatch<T>(&self) -> EdmError {
        EdmError::LayoutMismatch {
            type_name: self.name.clone(),
            expected: std::any::type_name::<T>(),
        }
    }
}

impl Clone for VectorMemberBuffer {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            values: self.values.clone_buffer(),
            offsets: self.offsets.clone(),
        }
    }
}

impl fmt::Debug for VectorMemberBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorMemberBuffer")
            .field("name", &self.name)
            .field("entries", &self.entries())
            .field("values", &self.values)
            .finish()
    }
}

/// The persistable image of one collection.
///
/// Subset collections carry no payload and exactly one reference vector
/// holding the addresses of the referenced records.
pub struct CollectionBuffers {
    /// Collection type name; key of the buffer factory and schema evolution.
    pub type_name: String,
    /// Layout version of the contents.
    pub schema_version: SchemaVersion,
    /// Whether these are the buffers of a subset collection.
    pub is_subset: bool,
    /// One payload element per record; `None` for subset collections.
    pub data: Option<Box<dyn DataBuffer>>,
    /// One vector per relation slot, one address per record.
    pub references: Vec<Vec<ObjectID>>,
    /// One buffer per vector member.
    pub vector_members: Vec<VectorMemberBuffer>,
}

impl CollectionBuffers {
    /// Empty buffers with the current layout of `R`.
    #[must_use]
    pub fn for_record<R: Record>(is_subset: bool) -> Self {
        let type_name = R::collection_type_name().into_owned();
        if is_subset {
            return Self {
                type_name,
                schema_version: R::SCHEMA_VERSION,
                is_subset,
                data: None,
                references: vec![Vec::new()],
                vector_members: Vec::new(),
            };
        }

        Self {
            type_name,
            schema_version: R::SCHEMA_VERSION,
            is_subset,
            data: Some(Box::new(Vec::<R::Data>::new())),
            references: vec![Vec::new(); R::Relations::NAMES.len()],
            vector_members: R::Members::allocate(),
        }
    }

    /// Number of records described by the buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_subset {
            self.references.first().map_or(0, Vec::len)
        } else {
            self.data.as_ref().map_or(0, |data| data.len())
        }
    }

    /// Whether the buffers describe no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload elements, if the payload buffer holds `D`.
    #[must_use]
    pub fn data<D: Pod + Send + Sync>(&self) -> Option<&[D]> {
        self.data
            .as_ref()?
            .as_any()
            .downcast_ref::<Vec<D>>()
            .map(Vec::as_slice)
    }

    /// Mutable payload, if the payload buffer holds `D`.
    pub fn data_mut<D: Pod + Send + Sync>(&mut self) -> Option<&mut Vec<D>> {
        self.data.as_mut()?.as_any_mut().downcast_mut::<Vec<D>>()
    }

    /// Take the payload out, if it holds `D`. Other payloads are left in place.
    pub fn take_data<D: Pod + Send + Sync>(&mut self) -> Option<Vec<D>> {
        if !self.data.as_ref()?.as_any().is::<Vec<D>>() {
            return None;
        }
        let data = self.data.take()?;
        data.into_any().downcast::<Vec<D>>().ok().map(|data| *data)
    }

    /// Replace the payload.
    pub fn set_data<D: Pod + Send + Sync>(&mut self, data: Vec<D>) {
        self.data = Some(Box::new(data));
    }

    /// Vector member buffer by name.
    #[must_use]
    pub fn vector_member(&self, name: &str) -> Option<&VectorMemberBuffer> {
        self.vector_members.iter().find(|m| m.name == name)
    }

    /// Mutable vector member buffer by name.
    pub fn vector_member_mut(&mut self, name: &str) -> Option<&mut VectorMemberBuffer> {
        self.vector_members.iter_mut().find(|m| m.name == name)
    }

    /// Byte image of the buffers under `collection_id`.
    #[must_use]
    pub fn to_raw(&self, collection_id: u32) -> RawCollection {
        RawCollection {
            type_name: self.type_name.clone(),
            schema_version: self.schema_version,
            collection_id,
            is_subset: self.is_subset,
            data: self
                .data
                .as_ref()
                .map(|data| data.as_bytes().to_vec())
                .unwrap_or_default(),
            references: self.references.clone(),
            vector_members: self.vector_members.iter().map(VectorMemberBuffer::to_raw).collect(),
        }
    }

    /// Replace the contents with a byte image.
    ///
    /// The image must have been written with the layout these buffers were
    /// allocated for. Members that the layout does not know are skipped, or
    /// rejected when `unknown_members` is strict.
    pub fn fill_from_raw(
        &mut self,
        raw: &RawCollection,
        unknown_members: DegradePolicy,
    ) -> EdmResult<()> {
        self.is_subset = raw.is_subset;

        if raw.is_subset {
            self.data = None;
            self.vector_members.clear();
            self.references = vec![raw.references.first().cloned().unwrap_or_default()];
            return Ok(());
        }

        match &mut self.data {
            Some(data) => {
                data.clear();
                data.extend_from_bytes(&raw.data)?;
            }
            None if raw.data.is_empty() => {}
            None => {
                return Err(EdmError::LayoutMismatch {
                    type_name: self.type_name.clone(),
                    expected: "a payload buffer",
                });
            }
        }

        self.references.clone_from(&raw.references);

        for member in &raw.vector_members {
            match self.vector_member_mut(&member.name) {
                Some(buffer) => buffer.fill_from_raw(member)?,
                None if unknown_members.is_strict() => {
                    return Err(EdmError::UnknownVectorMember {
                        type_name: self.type_name.clone(),
                        member: member.name.clone(),
                    });
                }
                None => warn!(
                    type_name = %self.type_name,
                    member = %member.name,
                    "skipping vector member unknown to the buffer layout"
                ),
            }
        }
        Ok(())
    }
}

impl Clone for CollectionBuffers {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name.clone(),
            schema_version: self.schema_version,
            is_subset: self.is_subset,
            data: self.data.as_ref().map(|data| data.clone_buffer()),
            references: self.references.clone(),
            vector_members: self.vector_members.clone(),
        }
    }
}

impl fmt::Debug for CollectionBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionBuffers")
            .field("type_name", &self.type_name)
            .field("schema_version", &self.schema_version)
            .field("is_subset", &self.is_subset)
            .field("len", &self.len())
            .field("relations", &self.references.len())
            .field("vector_members", &self.vector_members)
            .finish()
    }
}

/// Byte image of one vector member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVectorMember {
    pub name: String,
    pub values: Vec<u8>,
    pub offsets: Vec<u32>,
}

/// Byte image of one collection as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCollection {
    pub type_name: String,
    pub schema_version: SchemaVersion,
    pub collection_id: u32,
    pub is_subset: bool,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub references: Vec<Vec<ObjectID>>,
    #[serde(default)]
    pub vector_members: Vec<RawVectorMember>,
}
