//! Ogawa binary container and the object/property tree built on top of it.
//!
//! Ogawa is the modern binary format used by Alembic files (.abc).
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Magic: "Ogawa"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | ... Data ...     |
//! +------------------+
//! ```

mod format;
mod metadata;
mod node;
mod object;
mod property;
mod xform;

pub use format::*;
pub use metadata::{MetaData, INTERPRETATION_KEY, SCHEMA_BASE_KEY, SCHEMA_KEY};
pub use node::{Buffer, Data, Group, Node};
pub use object::{Archive, NamedProperty, Object, ObjectId, PropertyValue};
pub use property::{
    true_sample_index, ArrayProperty, PropertyHeader, PropertyKind, ScalarProperty,
};
pub use xform::{compose as compose_xform, decode_ops as decode_xform_ops, XformOp, XformOpType};
