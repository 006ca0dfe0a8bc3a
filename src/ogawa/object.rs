//! Object tree and archive-level decoding.
//!
//! Objects form a tree reached from a single top object. Each object is
//! represented as a Group whose first child is its properties (a compound
//! property, recursively the same shape used for nested compounds),
//! whose middle children are its child objects, and whose last child is a
//! Data blob describing those child objects by name and metadata.
//!
//! The tree is stored as an arena (`Vec<ObjectNode>`) indexed by
//! [`ObjectId`] rather than built from `Rc`/`Weak` handles: parent links are
//! plain indices, so there is no reference-counting or cycle to manage for
//! a structure that is immutable once parsed.

use super::metadata::{read_indexed_metadata, MetaData};
use super::node::{Buffer, Group};
use super::property::{read_property_header, ArrayProperty, PropertyHeader, PropertyKind, ScalarProperty};
use super::xform;
use crate::util::{Error, Mat4, Result};

/// Index of an object within an [`Archive`]'s arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

/// A decoded property, named and attached to either an object's root
/// compound or a nested compound property.
pub struct NamedProperty<'a> {
    pub name: String,
    pub header: PropertyHeader,
    pub value: PropertyValue<'a>,
}

pub enum PropertyValue<'a> {
    Compound(Vec<NamedProperty<'a>>),
    Scalar(ScalarProperty<'a>),
    Array(ArrayProperty<'a>),
}

struct ObjectNode<'a> {
    name: String,
    path: String,
    metadata: MetaData,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    properties: Vec<NamedProperty<'a>>,
}

/// A parsed Ogawa/Alembic archive.
///
/// Borrows the byte buffer it was parsed from; every object, property and
/// sample accessor returned from it shares that same lifetime.
pub struct Archive<'a> {
    objects: Vec<ObjectNode<'a>>,
    root: ObjectId,
    metadata: MetaData,
}

/// One record parsed from an object-header Data blob: a child object's name
/// plus its metadata (resolved from the indexed table or an inline blob).
struct ChildRecord {
    name: String,
    metadata: MetaData,
}

fn read_u32_name(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let len_bytes = bytes.get(*pos..*pos + 4).ok_or(Error::TooShort {
        needed: *pos + 4,
        actual: bytes.len(),
    })?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    *pos += 4;
    let s = bytes.get(*pos..*pos + len).ok_or(Error::TooShort {
        needed: *pos + len,
        actual: bytes.len(),
    })?;
    *pos += len;
    Ok(std::str::from_utf8(s)?.to_owned())
}

fn resolve_metadata_token<'m>(
    bytes: &[u8],
    pos: &mut usize,
    token: u8,
    indexed: &'m [MetaData],
) -> Result<MetaData> {
    if token == 0xFF {
        let len_bytes = bytes.get(*pos..*pos + 4).ok_or(Error::TooShort {
            needed: *pos + 4,
            actual: bytes.len(),
        })?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        *pos += 4;
        let s = bytes.get(*pos..*pos + len).ok_or(Error::TooShort {
            needed: *pos + len,
            actual: bytes.len(),
        })?;
        *pos += len;
        Ok(MetaData::parse(std::str::from_utf8(s)?))
    } else {
        Ok(indexed
            .get(token as usize)
            .cloned()
            .unwrap_or_else(MetaData::new))
    }
}

/// Number of leading bytes in an object-header Data blob reserved for a
/// hash this reader does not verify.
const OBJECT_HEADER_HASH_SIZE: usize = 32;

fn read_child_records(bytes: &[u8], indexed: &[MetaData]) -> Result<Vec<ChildRecord>> {
    let mut out = Vec::new();
    if bytes.len() < OBJECT_HEADER_HASH_SIZE {
        return Ok(out);
    }
    let mut pos = OBJECT_HEADER_HASH_SIZE;
    while pos < bytes.len() {
        let name = read_u32_name(bytes, &mut pos)?;
        let token = *bytes.get(pos).ok_or(Error::TooShort {
            needed: pos + 1,
            actual: bytes.len(),
        })?;
        pos += 1;
        let metadata = resolve_metadata_token(bytes, &mut pos, token, indexed)?;
        out.push(ChildRecord { name, metadata });
    }
    Ok(out)
}

/// Decode a properties group (an object's root compound, or a nested
/// compound property's own group) into its named properties.
fn decode_properties_group<'a>(
    group: Group<'a>,
    indexed: &[MetaData],
) -> Result<Vec<NamedProperty<'a>>> {
    let count = group.num_children();
    if count == 0 {
        return Ok(Vec::new());
    }
    let header_data = group.data(count - 1)?;
    let header_bytes = header_data.bytes()?;
    let num_properties = count - 1;

    let mut pos = 0usize;
    let mut headers = Vec::with_capacity(num_properties as usize);
    for _ in 0..num_properties {
        let lookup = |token: u8| indexed.get(token as usize).cloned().unwrap_or_else(MetaData::new);
        let header = read_property_header(header_bytes, &mut pos, lookup)?;
        headers.push(header);
    }

    let mut out = Vec::with_capacity(headers.len());
    for (i, header) in headers.into_iter().enumerate() {
        let child_group = group.group(i as u64)?;
        let name = header.name.clone();
        let value = match header.kind {
            PropertyKind::Compound => {
                PropertyValue::Compound(decode_properties_group(child_group, indexed)?)
            }
            PropertyKind::Scalar => {
                PropertyValue::Scalar(ScalarProperty::new(header.clone(), child_group, 0))
            }
            PropertyKind::Array => {
                PropertyValue::Array(ArrayProperty::new(header.clone(), child_group, 0))
            }
        };
        out.push(NamedProperty { name, header, value });
    }
    Ok(out)
}

fn build_object<'a>(
    group: Group<'a>,
    parent: Option<ObjectId>,
    name: String,
    metadata: MetaData,
    path: String,
    indexed: &[MetaData],
    arena: &mut Vec<ObjectNode<'a>>,
) -> Result<ObjectId> {
    tracing::trace!(path = %path, "decoding object");
    let count = group.num_children();

    let properties = if count >= 1 {
        decode_properties_group(group.group(0)?, indexed)?
    } else {
        Vec::new()
    };

    let child_records = if count >= 2 {
        read_child_records(group.data(count - 1)?.bytes()?, indexed)?
    } else {
        Vec::new()
    };

    let id = ObjectId(arena.len());
    arena.push(ObjectNode {
        name,
        path: path.clone(),
        metadata,
        parent,
        children: Vec::new(),
        properties,
    });

    let mut children = Vec::with_capacity(child_records.len());
    for (i, record) in child_records.into_iter().enumerate() {
        let child_index = i as u64;
        // The boundary mirrors the reference parser's check exactly: a
        // child-object record at position i is only valid if a
        // corresponding child group exists at position i+1, distinct from
        // the trailing header slot.
        if child_index + 2 >= count {
            break;
        }
        let child_group = group.group(child_index + 1)?;
        let child_path = if path == "/" {
            format!("/{}", record.name)
        } else {
            format!("{path}/{}", record.name)
        };
        let child_id = build_object(
            child_group,
            Some(id),
            record.name,
            record.metadata,
            child_path,
            indexed,
            arena,
        )?;
        children.push(child_id);
    }
    arena[id.0].children = children;

    Ok(id)
}

impl<'a> Archive<'a> {
    /// Parse a full Ogawa/Alembic archive from a byte buffer.
    ///
    /// Failure anywhere in the Ogawa or object tree aborts the whole parse;
    /// per §7 this is the only point that logs, so a caller probing
    /// individual properties afterward doesn't get log spam for expected
    /// "not found" outcomes.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        tracing::debug!(len = bytes.len(), "parsing Ogawa archive");
        Self::parse_inner(bytes).inspect_err(|err| {
            tracing::warn!(%err, "failed to parse Alembic archive");
        })
    }

    fn parse_inner(bytes: &'a [u8]) -> Result<Self> {
        let buf = Buffer::new(bytes);
        let root = buf.root_group()?;
        let num_root_children = root.num_children();

        if num_root_children < 3 {
            return Err(Error::structure(
                "archive root with format/version/top-object children",
                "fewer children",
            ));
        }

        let indexed_metadata = if num_root_children > 5 {
            read_indexed_metadata(root.data(5)?)?
        } else {
            vec![MetaData::new()]
        };

        let archive_metadata = if num_root_children > 3 {
            let d = root.data(3)?;
            if d.is_empty() {
                MetaData::new()
            } else {
                MetaData::parse(d.as_str()?)
            }
        } else {
            MetaData::new()
        };

        // Root child 4 (time samplings) is intentionally left unparsed.

        let top_group = root.group(2)?;
        let mut arena = Vec::new();
        let root_id = build_object(
            top_group,
            None,
            "ABC".to_string(),
            archive_metadata.clone(),
            "/".to_string(),
            &indexed_metadata,
            &mut arena,
        )?;

        Ok(Self {
            objects: arena,
            root: root_id,
            metadata: archive_metadata,
        })
    }

    /// Archive-wide metadata (root child 3).
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// The top object.
    pub fn top(&self) -> Object<'a, '_> {
        Object {
            archive: self,
            id: self.root,
        }
    }

    /// Resolve an absolute, slash-separated object path (e.g. `/geo/mesh1`)
    /// to an object. An empty path or `/` resolves to the top object.
    pub fn find(&self, path: &str) -> Option<Object<'a, '_>> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Some(self.top());
        }
        let mut current = self.root;
        for segment in trimmed.split('/') {
            let node = &self.objects[current.0];
            let next = node
                .children
                .iter()
                .find(|c| self.objects[c.0].name == segment)?;
            current = *next;
        }
        Some(Object {
            archive: self,
            id: current,
        })
    }
}

/// A handle to one object in an [`Archive`]'s tree.
#[derive(Clone, Copy)]
pub struct Object<'a, 'b> {
    archive: &'b Archive<'a>,
    id: ObjectId,
}

impl<'a, 'b> Object<'a, 'b> {
    fn node(&self) -> &'b ObjectNode<'a> {
        &self.archive.objects[self.id.0]
    }

    pub fn name(&self) -> &'b str {
        &self.node().name
    }

    pub fn path(&self) -> &'b str {
        &self.node().path
    }

    pub fn metadata(&self) -> &'b MetaData {
        &self.node().metadata
    }

    pub fn num_children(&self) -> usize {
        self.node().children.len()
    }

    pub fn child(&self, index: usize) -> Option<Object<'a, 'b>> {
        self.node().children.get(index).map(|id| Object {
            archive: self.archive,
            id: *id,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = Object<'a, 'b>> + 'b {
        let archive = self.archive;
        self.node().children.iter().map(move |id| Object {
            archive,
            id: *id,
        })
    }

    pub fn find_child(&self, name: &str) -> Option<Object<'a, 'b>> {
        self.children().find(|c| c.name() == name)
    }

    /// Top-level properties directly on this object (its root compound's
    /// children).
    pub fn properties(&self) -> &'b [NamedProperty<'a>] {
        &self.node().properties
    }

    /// Resolve a slash-separated property path relative to this object's
    /// root compound, e.g. `.xform/.vals`. Every segment but the last must
    /// name a compound property.
    pub fn find_property(&self, path: &str) -> Option<&'b PropertyValue<'a>> {
        let mut current: &[NamedProperty<'a>] = self.properties();
        let mut segments = path.split('/').peekable();
        loop {
            let segment = segments.next()?;
            let found = current.iter().find(|p| p.name == segment)?;
            match segments.peek() {
                None => return Some(&found.value),
                Some(_) => match &found.value {
                    PropertyValue::Compound(children) => current = children,
                    _ => return None,
                },
            }
        }
    }

    /// Compose this object's `.xform/.ops` + `.xform/.vals` at `sample` into
    /// a 4x4 matrix, per §4.8. Fails if either array property is missing or
    /// not the expected kind, or if the op/value streams disagree.
    pub fn xform_matrix(&self, sample: u64) -> Result<Mat4> {
        let ops = match self.find_property(".xform/.ops") {
            Some(PropertyValue::Array(p)) => p,
            _ => return Err(Error::structure("array property .xform/.ops", "missing or wrong kind")),
        };
        let vals = match self.find_property(".xform/.vals") {
            Some(PropertyValue::Array(p)) => p,
            _ => return Err(Error::structure("array property .xform/.vals", "missing or wrong kind")),
        };
        let ops_bytes: Vec<u8> = ops.get_all(sample)?;
        let decoded = xform::decode_ops(&ops_bytes)?;
        let vals_f64: Vec<f64> = vals.get_all(sample)?;
        xform::compose(&decoded, &vals_f64)
    }
}
