//! Xform sample composition.
//!
//! An `Xform` schema object stores its transform as two array properties:
//! `.xform/.ops` (one byte per operation, packing an op type and a channel
//! hint) and `.xform/.vals` (the flat stream of float operands those ops
//! consume, in order). Composing a sample means walking the ops in order,
//! building each op's 4x4 matrix, and right-multiplying it into an
//! accumulating result.

use crate::util::{Error, Mat4, Result, Vec3};

/// The operation encoded in the high nibble of an ops byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XformOpType {
    Scale,
    Translate,
    Rotate,
    Matrix,
    RotateX,
    RotateY,
    RotateZ,
}

impl XformOpType {
    fn from_nibble(n: u8) -> Result<Self> {
        match n {
            0 => Ok(Self::Scale),
            1 => Ok(Self::Translate),
            2 => Ok(Self::Rotate),
            3 => Ok(Self::Matrix),
            4 => Ok(Self::RotateX),
            5 => Ok(Self::RotateY),
            6 => Ok(Self::RotateZ),
            _ => Err(Error::BadEnum {
                what: "xform op type",
                value: n as u32,
            }),
        }
    }

    /// Number of `f64` operands this op consumes from `.xform/.vals`.
    fn operand_count(self) -> usize {
        match self {
            Self::Scale | Self::Translate => 3,
            Self::Rotate => 4,
            Self::Matrix => 16,
            Self::RotateX | Self::RotateY | Self::RotateZ => 1,
        }
    }
}

/// One decoded entry from `.xform/.ops`: an operation type plus its channel
/// hint (the low nibble, carried through unused by composition).
#[derive(Clone, Copy, Debug)]
pub struct XformOp {
    pub op_type: XformOpType,
    pub hint: u8,
}

/// Decode the raw `.xform/.ops` byte stream.
pub fn decode_ops(bytes: &[u8]) -> Result<Vec<XformOp>> {
    bytes
        .iter()
        .map(|&b| {
            Ok(XformOp {
                op_type: XformOpType::from_nibble(b >> 4)?,
                hint: b & 0x0F,
            })
        })
        .collect()
}

fn op_matrix(op_type: XformOpType, operands: &[f64]) -> Result<Mat4> {
    let f = |i: usize| operands[i] as f32;
    Ok(match op_type {
        XformOpType::Scale => Mat4::from_scale(Vec3::new(f(0), f(1), f(2))),
        XformOpType::Translate => Mat4::from_translation(Vec3::new(f(0), f(1), f(2))),
        XformOpType::Rotate => {
            let axis = Vec3::new(f(0), f(1), f(2));
            let angle = f(3).to_radians();
            Mat4::from_axis_angle(axis.normalize_or_zero(), angle)
        }
        XformOpType::Matrix => {
            // Operands are row-major; glam's from_cols_array expects
            // column-major, so transpose while copying.
            let mut cols = [0.0f32; 16];
            for r in 0..4 {
                for c in 0..4 {
                    cols[c * 4 + r] = f(r * 4 + c);
                }
            }
            Mat4::from_cols_array(&cols)
        }
        XformOpType::RotateX => Mat4::from_rotation_x(f(0).to_radians()),
        XformOpType::RotateY => Mat4::from_rotation_y(f(0).to_radians()),
        XformOpType::RotateZ => Mat4::from_rotation_z(f(0).to_radians()),
    })
}

/// Compose a full transform sample from its decoded ops and the flat
/// `.xform/.vals` operand stream.
pub fn compose(ops: &[XformOp], vals: &[f64]) -> Result<Mat4> {
    let mut result = Mat4::IDENTITY;
    let mut pos = 0usize;
    for op in ops {
        let n = op.op_type.operand_count();
        let operands = vals.get(pos..pos + n).ok_or(Error::TooShort {
            needed: pos + n,
            actual: vals.len(),
        })?;
        let m = op_matrix(op.op_type, operands)?;
        result *= m;
        pos += n;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ops() {
        let bytes = [0x00, 0x10, 0x23];
        let ops = decode_ops(&bytes).unwrap();
        assert_eq!(ops[0].op_type, XformOpType::Scale);
        assert_eq!(ops[1].op_type, XformOpType::Translate);
        assert_eq!(ops[2].op_type, XformOpType::Rotate);
        assert_eq!(ops[2].hint, 3);
    }

    #[test]
    fn test_decode_ops_invalid_type() {
        assert!(decode_ops(&[0x70]).is_err());
    }

    #[test]
    fn test_compose_identity_scale() {
        let ops = decode_ops(&[0x00]).unwrap();
        let vals = vec![1.0, 1.0, 1.0];
        let m = compose(&ops, &vals).unwrap();
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_compose_translate() {
        let ops = decode_ops(&[0x10]).unwrap();
        let vals = vec![1.0, 2.0, 3.0];
        let m = compose(&ops, &vals).unwrap();
        let translated = m.transform_point3(glam::Vec3::ZERO);
        assert!((translated.x - 1.0).abs() < 1e-6);
        assert!((translated.y - 2.0).abs() < 1e-6);
        assert!((translated.z - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_compose_scale_then_translate_order() {
        // scale by 2, then translate by (1,0,0): point (1,0,0) -> scale ->
        // (2,0,0) -> translate -> (3,0,0).
        let ops = decode_ops(&[0x00, 0x10]).unwrap();
        let vals = vec![2.0, 2.0, 2.0, 1.0, 0.0, 0.0];
        let m = compose(&ops, &vals).unwrap();
        let p = m.transform_point3(glam::Vec3::new(1.0, 0.0, 0.0));
        assert!((p.x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_compose_truncated_vals_errors() {
        let ops = decode_ops(&[0x00]).unwrap();
        let vals = vec![1.0, 1.0];
        assert!(compose(&ops, &vals).is_err());
    }

    #[test]
    fn test_rotate_z_90_degrees() {
        let ops = decode_ops(&[0x60]).unwrap();
        let vals = vec![90.0];
        let m = compose(&ops, &vals).unwrap();
        let p = m.transform_point3(glam::Vec3::new(1.0, 0.0, 0.0));
        assert!(p.x.abs() < 1e-5);
        assert!((p.y - 1.0).abs() < 1e-5);
    }
}
