//! Property headers and sample access.
//!
//! A property is either a scalar (one value per sample), an array (a
//! variable-length vector of values per sample), or a compound (a named
//! group of child properties, carrying no samples of its own). Each
//! non-compound property's header packs its kind, POD type, extent and
//! sample bookkeeping into a single 32-bit word, followed by a handful of
//! size-hint-width tail integers.

use super::metadata::MetaData;
use super::node::{Data, Group};
use crate::util::{DataType, Error, PlainOldDataType, Result};

/// The kind of a property, packed into the low 2 bits of its header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Compound,
    Scalar,
    Array,
}

impl PropertyKind {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(Self::Compound),
            1 => Ok(Self::Scalar),
            2 | 3 => Ok(Self::Array),
            _ => Err(Error::BadEnum {
                what: "property kind",
                value: bits,
            }),
        }
    }
}

/// Width used to encode the variable-length tail integers that follow a
/// property header's fixed 32-bit info word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SizeHint {
    U8,
    U16,
    U32,
}

impl SizeHint {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(Self::U8),
            1 => Ok(Self::U16),
            2 => Ok(Self::U32),
            _ => Err(Error::BadEnum {
                what: "property size hint",
                value: bits,
            }),
        }
    }
}

fn bits(word: u32, shift: u32, width: u32) -> u32 {
    (word >> shift) & ((1u32 << width) - 1)
}

/// A fully decoded property header: the packed info word, its size-hint
/// tail, and the name/metadata that follow it in the same header record.
#[derive(Clone, Debug)]
pub struct PropertyHeader {
    pub kind: PropertyKind,
    pub data_type: DataType,
    /// True if every sample after the first is a repeat of a prior one, per
    /// the stored bit. Not used to resolve sample lookups: the true-index
    /// arithmetic in [`true_sample_index`] already accounts for
    /// de-duplication independent of this flag.
    pub homogeneous: bool,
    pub time_sampling_index: u32,
    pub next_sample_index: u64,
    pub first_changed_index: u64,
    pub last_changed_index: u64,
    pub name: String,
    pub metadata: MetaData,
}

/// Read one size-hint-width unsigned integer at `pos`, advancing `pos`.
fn read_hinted(bytes: &[u8], pos: &mut usize, hint: SizeHint) -> Result<u64> {
    let (width, value) = match hint {
        SizeHint::U8 => {
            let b = *bytes.get(*pos).ok_or(Error::TooShort {
                needed: *pos + 1,
                actual: bytes.len(),
            })?;
            (1, b as u64)
        }
        SizeHint::U16 => {
            let s = bytes.get(*pos..*pos + 2).ok_or(Error::TooShort {
                needed: *pos + 2,
                actual: bytes.len(),
            })?;
            (2, u16::from_le_bytes(s.try_into().unwrap()) as u64)
        }
        SizeHint::U32 => {
            let s = bytes.get(*pos..*pos + 4).ok_or(Error::TooShort {
                needed: *pos + 4,
                actual: bytes.len(),
            })?;
            (4, u32::from_le_bytes(s.try_into().unwrap()) as u64)
        }
    };
    *pos += width;
    Ok(value)
}

/// Read a size-hint-width `name_length` followed by that many bytes of
/// UTF-8, per the header's name section.
fn read_hinted_name(bytes: &[u8], pos: &mut usize, hint: SizeHint) -> Result<String> {
    let len = read_hinted(bytes, pos, hint)? as usize;
    let s = bytes.get(*pos..*pos + len).ok_or(Error::TooShort {
        needed: *pos + len,
        actual: bytes.len(),
    })?;
    *pos += len;
    Ok(std::str::from_utf8(s)?.to_owned())
}

/// Parse one property header starting at `*pos` in `bytes`, advancing `pos`
/// past it. `lookup_metadata` resolves a non-inline metadata token (an
/// index into the archive's indexed metadata table) into a [`MetaData`].
///
/// Field order matches §4.6 exactly: info word, then (for scalar/array
/// kinds only) the sample-count/time-sampling tail, then the name section,
/// then the metadata section. A compound header has no sample-count tail
/// at all and goes straight from the info word to its name.
pub fn read_property_header(
    bytes: &[u8],
    pos: &mut usize,
    lookup_metadata: impl Fn(u8) -> MetaData,
) -> Result<PropertyHeader> {
    let word_bytes = bytes.get(*pos..*pos + 4).ok_or(Error::TooShort {
        needed: *pos + 4,
        actual: bytes.len(),
    })?;
    let word = u32::from_le_bytes(word_bytes.try_into().unwrap());
    *pos += 4;

    let kind = PropertyKind::from_bits(bits(word, 0, 2))?;
    let hint = SizeHint::from_bits(bits(word, 2, 2))?;
    let pod = PlainOldDataType::from_u8(bits(word, 4, 4) as u8);
    let has_time_sampling_index = bits(word, 8, 1) != 0;
    let has_first_last_changed = bits(word, 9, 1) != 0;
    let homogeneous = bits(word, 10, 1) != 0;
    let zero_first_last_changed = bits(word, 11, 1) != 0;
    let extent = bits(word, 12, 8) as u8;
    let metadata_token = bits(word, 20, 8) as u8;

    let (next_sample_index, time_sampling_index, first_changed_index, last_changed_index) =
        if kind == PropertyKind::Compound {
            (0, 0, 0, 0)
        } else {
            if pod == PlainOldDataType::Unknown {
                return Err(Error::BadEnum {
                    what: "property POD type",
                    value: bits(word, 4, 4),
                });
            }
            let next_sample_index = read_hinted(bytes, pos, hint)?;

            let (first_changed_index, last_changed_index) = if has_first_last_changed {
                let first = read_hinted(bytes, pos, hint)?;
                let last = read_hinted(bytes, pos, hint)?;
                (first, last)
            } else if zero_first_last_changed {
                (0, 0)
            } else {
                (1, next_sample_index.saturating_sub(1))
            };

            let time_sampling_index = if has_time_sampling_index {
                read_hinted(bytes, pos, hint)? as u32
            } else {
                0
            };

            (
                next_sample_index,
                time_sampling_index,
                first_changed_index,
                last_changed_index,
            )
        };

    let name = read_hinted_name(bytes, pos, hint)?;

    let metadata = if metadata_token == 0xFF {
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
        MetaData::parse(std::str::from_utf8(s)?)
    } else {
        lookup_metadata(metadata_token)
    };

    Ok(PropertyHeader {
        kind,
        data_type: DataType::new(pod, extent),
        homogeneous,
        time_sampling_index,
        next_sample_index,
        first_changed_index,
        last_changed_index,
        name,
        metadata,
    })
}

/// Map a logical sample index `l` to the true index of the stored blob,
/// collapsing runs of de-duplicated samples down to a single stored copy.
///
/// Returns `Err(Error::BadIndex)` if `l` is not a valid logical index for
/// this property (i.e. `l >= next_sample_index`).
pub fn true_sample_index(header: &PropertyHeader, l: u64) -> Result<u64> {
    if l >= header.next_sample_index {
        return Err(Error::bad_index("sample", l, header.next_sample_index));
    }
    let first = header.first_changed_index;
    let last = header.last_changed_index;
    if l < first || (first == 0 && last == 0) {
        Ok(0)
    } else if l >= last {
        Ok(last - first + 1)
    } else {
        Ok(l - first + 1)
    }
}

/// 16-byte hash prefix on every stored sample blob, skipped when reading
/// payload bytes.
const SAMPLE_HASH_SIZE: u64 = 16;

/// A scalar property's accessor: the data/sub-group children live in the
/// owning properties group at known indices.
pub struct ScalarProperty<'a> {
    pub header: PropertyHeader,
    samples: Group<'a>,
    child_index: u64,
}

/// An array property's accessor: each logical sample pairs a data child
/// (the flat element buffer) with a dims child (the shape), at indices
/// `2*T` and `2*T+1`.
pub struct ArrayProperty<'a> {
    pub header: PropertyHeader,
    samples: Group<'a>,
    child_index: u64,
}

impl<'a> ScalarProperty<'a> {
    pub fn new(header: PropertyHeader, samples: Group<'a>, child_index: u64) -> Self {
        Self {
            header,
            samples,
            child_index,
        }
    }

    pub fn num_samples(&self) -> u64 {
        self.header.next_sample_index
    }

    fn sample_data(&self, l: u64) -> Result<Data<'a>> {
        let t = true_sample_index(&self.header, l)?;
        self.samples.data(self.child_index + t)
    }

    /// Raw payload bytes for logical sample `l`, with the leading hash
    /// stripped.
    pub fn raw(&self, l: u64) -> Result<&'a [u8]> {
        let data = self.sample_data(l)?;
        if data.is_empty() {
            return Ok(&[]);
        }
        data.slice(SAMPLE_HASH_SIZE, data.len() - SAMPLE_HASH_SIZE)
    }

    /// Read sample `l` as `extent` consecutive POD values, cast to `T`.
    pub fn get<T: bytemuck::Pod>(&self, l: u64) -> Result<Vec<T>> {
        let bytes = self.raw(l)?;
        let pod_size = self.header.data_type.pod.num_bytes();
        let extent = self.header.data_type.extent as usize;
        let mut out = Vec::with_capacity(extent);
        for i in 0..extent {
            let chunk = bytes
                .get(i * pod_size..(i + 1) * pod_size)
                .ok_or(Error::OutOfBounds {
                    offset: (i * pod_size) as u64,
                    len: pod_size as u64,
                    buffer_len: bytes.len() as u64,
                })?;
            out.push(cast_pod::<T>(chunk, self.header.data_type.pod)?);
        }
        Ok(out)
    }

    /// Read sample `l` as a 3-component vector (extent must be 3).
    pub fn get_vec3(&self, l: u64) -> Result<[f64; 3]> {
        if self.header.data_type.extent != 3 {
            return Err(Error::structure("extent 3", "other extent"));
        }
        let v: Vec<f64> = self.get(l)?;
        Ok([v[0], v[1], v[2]])
    }

    /// Read sample `l` as a 4x4 row-major matrix. A 3x3 (extent 9) sample is
    /// embedded into the upper-left of an identity 4x4.
    pub fn get_matrix(&self, l: u64) -> Result<[[f64; 4]; 4]> {
        let v: Vec<f64> = self.get(l)?;
        let mut m = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        match self.header.data_type.extent {
            9 => {
                for r in 0..3 {
                    for c in 0..3 {
                        m[r][c] = v[r * 3 + c];
                    }
                }
            }
            16 => {
                for r in 0..4 {
                    for c in 0..4 {
                        m[r][c] = v[r * 4 + c];
                    }
                }
            }
            _ => return Err(Error::structure("extent 9 or 16", "other extent")),
        }
        Ok(m)
    }
}

impl<'a> ArrayProperty<'a> {
    pub fn new(header: PropertyHeader, samples: Group<'a>, child_index: u64) -> Self {
        Self {
            header,
            samples,
            child_index,
        }
    }

    pub fn num_samples(&self) -> u64 {
        self.header.next_sample_index
    }

    /// Number of elements stored in logical sample `l`.
    pub fn len(&self, l: u64) -> Result<usize> {
        let t = true_sample_index(&self.header, l)?;
        let data = self.samples.data(self.child_index + 2 * t)?;
        let dims = self.samples.data(self.child_index + 2 * t + 1)?;
        let pod_size = self.header.data_type.pod.num_bytes();
        let extent = self.header.data_type.extent as usize;

        if dims.is_empty() {
            if pod_size == 0 || extent == 0 {
                return Ok(0);
            }
            let payload = data.len().saturating_sub(SAMPLE_HASH_SIZE);
            return Ok(payload as usize / (pod_size * extent));
        }

        let raw = dims.bytes()?;
        let mut product: u64 = 1;
        for chunk in raw.chunks_exact(8) {
            product = product.saturating_mul(u64::from_le_bytes(chunk.try_into().unwrap()));
        }
        Ok(product as usize)
    }

    /// Get all elements of logical sample `l`, cast to `T`.
    pub fn get_all<T: bytemuck::Pod>(&self, l: u64) -> Result<Vec<T>> {
        let t = true_sample_index(&self.header, l)?;
        let data = self.samples.data(self.child_index + 2 * t)?;
        let n = self.len(l)?;
        let pod_size = self.header.data_type.pod.num_bytes();
        let extent = self.header.data_type.extent as usize;
        let bytes = if data.is_empty() {
            &[][..]
        } else {
            data.slice(SAMPLE_HASH_SIZE, data.len() - SAMPLE_HASH_SIZE)?
        };

        let mut out = Vec::with_capacity(n * extent);
        for i in 0..n * extent {
            let chunk = bytes
                .get(i * pod_size..(i + 1) * pod_size)
                .ok_or(Error::OutOfBounds {
                    offset: (i * pod_size) as u64,
                    len: pod_size as u64,
                    buffer_len: bytes.len() as u64,
                })?;
            out.push(cast_pod::<T>(chunk, self.header.data_type.pod)?);
        }
        Ok(out)
    }
}

/// Cast a raw POD byte chunk of the archive's native type into `T`.
///
/// Supports the common widening float cases (f16/f32 -> f64, etc.) used by
/// the typed accessors; any other pairing bytemuck-casts directly and
/// relies on the caller having picked a matching `T`.
fn cast_pod<T: bytemuck::Pod>(chunk: &[u8], pod: PlainOldDataType) -> Result<T> {
    use half::f16;
    match pod {
        PlainOldDataType::Float32 if std::mem::size_of::<T>() == 8 => {
            let v = f32::from_le_bytes(chunk.try_into().unwrap()) as f64;
            Ok(*bytemuck::from_bytes(bytemuck::bytes_of(&v)))
        }
        PlainOldDataType::Float16 if std::mem::size_of::<T>() == 8 => {
            let v = f16::from_le_bytes(chunk.try_into().unwrap()).to_f64();
            Ok(*bytemuck::from_bytes(bytemuck::bytes_of(&v)))
        }
        _ => bytemuck::try_from_bytes::<T>(chunk)
            .copied()
            .map_err(|_| Error::other("POD size mismatch during cast")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build raw header bytes in the same field order `read_property_header`
    /// expects: info word, (scalar/array tail), name, metadata.
    fn header(
        kind: u32,
        hint: u32,
        pod: u32,
        extent: u32,
        next: u64,
        first: u64,
        last: u64,
        name: &str,
    ) -> Vec<u8> {
        let word: u32 = kind
            | (hint << 2)
            | (pod << 4)
            | (1 << 9) // has_first_last_changed
            | (extent << 12)
            | (0u32 << 20); // metadata_token 0 -> indexed lookup
        let mut out = word.to_le_bytes().to_vec();
        if kind != 0 {
            out.push(next as u8);
            out.push(first as u8);
            out.push(last as u8);
        }
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out
    }

    #[test]
    fn test_read_scalar_header() {
        let bytes = header(1, 0, PlainOldDataType::Float64 as u32, 3, 5, 0, 4, "P");
        let mut pos = 0;
        let h = read_property_header(&bytes, &mut pos, |_| MetaData::new()).unwrap();
        assert_eq!(h.kind, PropertyKind::Scalar);
        assert_eq!(h.data_type.pod, PlainOldDataType::Float64);
        assert_eq!(h.data_type.extent, 3);
        assert_eq!(h.next_sample_index, 5);
        assert_eq!(h.first_changed_index, 0);
        assert_eq!(h.last_changed_index, 4);
        assert_eq!(h.name, "P");
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn test_read_compound_header_skips_sample_tail() {
        let bytes = header(0, 0, 0, 0, 0, 0, 0, "xform");
        let mut pos = 0;
        let h = read_property_header(&bytes, &mut pos, |_| MetaData::new()).unwrap();
        assert_eq!(h.kind, PropertyKind::Compound);
        assert_eq!(h.name, "xform");
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn test_true_sample_index_constant_property() {
        let h = PropertyHeader {
            kind: PropertyKind::Scalar,
            data_type: DataType::FLOAT64,
            homogeneous: true,
            time_sampling_index: 0,
            next_sample_index: 10,
            first_changed_index: 0,
            last_changed_index: 0,
            name: String::new(),
            metadata: MetaData::new(),
        };
        for l in 0..10 {
            assert_eq!(true_sample_index(&h, l).unwrap(), 0);
        }
    }

    #[test]
    fn test_true_sample_index_changing_property() {
        let h = PropertyHeader {
            kind: PropertyKind::Scalar,
            data_type: DataType::FLOAT64,
            homogeneous: false,
            time_sampling_index: 0,
            next_sample_index: 6,
            first_changed_index: 2,
            last_changed_index: 4,
            name: String::new(),
            metadata: MetaData::new(),
        };
        assert_eq!(true_sample_index(&h, 0).unwrap(), 0);
        assert_eq!(true_sample_index(&h, 1).unwrap(), 0);
        assert_eq!(true_sample_index(&h, 2).unwrap(), 1);
        assert_eq!(true_sample_index(&h, 3).unwrap(), 2);
        assert_eq!(true_sample_index(&h, 4).unwrap(), 3);
        assert_eq!(true_sample_index(&h, 5).unwrap(), 3);
    }

    #[test]
    fn test_true_sample_index_out_of_range() {
        let h = PropertyHeader {
            kind: PropertyKind::Scalar,
            data_type: DataType::FLOAT64,
            homogeneous: true,
            time_sampling_index: 0,
            next_sample_index: 3,
            first_changed_index: 0,
            last_changed_index: 0,
            name: String::new(),
            metadata: MetaData::new(),
        };
        assert!(matches!(
            true_sample_index(&h, 3),
            Err(Error::BadIndex { what: "sample", .. })
        ));
    }
}
