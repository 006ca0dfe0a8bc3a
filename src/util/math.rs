//! Math type re-exports used by the transform builder.

pub use glam::{Mat4, Vec3, Vec4};
