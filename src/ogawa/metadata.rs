//! Object/property metadata: a small ordered set of string key/value pairs,
//! plus the archive-wide indexed metadata table that property headers point
//! into.

use smallvec::SmallVec;

use super::node::Data;
use crate::util::Result;

/// Schema-related well-known keys, as used by Alembic-producing tools.
pub const SCHEMA_KEY: &str = "schema";
pub const SCHEMA_BASE_KEY: &str = "schemaBaseType";
pub const INTERPRETATION_KEY: &str = "interpretation";

/// An ordered set of string metadata key/value pairs attached to an object
/// or property.
///
/// Encoded on disk as `key=value` pairs joined by `;`, with no escaping:
/// keys and values may not themselves contain `;` or `=`. This matches how
/// Alembic-producing tools write metadata in practice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaData {
    entries: SmallVec<[(String, String); 4]>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a metadata string of the form `key1=value1;key2=value2`.
    ///
    /// Items without an `=` are skipped. If a key repeats, the last
    /// occurrence wins.
    pub fn parse(s: &str) -> Self {
        let mut md = Self::new();
        for item in s.split(';') {
            if item.is_empty() {
                continue;
            }
            if let Some(eq) = item.find('=') {
                let key = &item[..eq];
                let value = &item[eq + 1..];
                if !key.is_empty() {
                    md.set(key, value);
                }
            }
        }
        md
    }

    /// Serialize back to `key1=value1;key2=value2` form.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value.into();
        } else {
            self.entries.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn schema(&self) -> Option<&str> {
        self.get(SCHEMA_KEY)
    }

    pub fn interpretation(&self) -> Option<&str> {
        self.get(INTERPRETATION_KEY)
    }
}

/// Parse the archive-wide indexed metadata table (root child 5).
///
/// The table is a stream of `(u8 length, length bytes)` records; index 0 is
/// reserved and always parses as empty metadata. A property header whose
/// metadata token is not `0xFF` is an index into this table.
pub fn read_indexed_metadata(data: Data<'_>) -> Result<Vec<MetaData>> {
    let bytes = data.bytes()?;
    let mut out = vec![MetaData::new()];
    let mut pos = 0usize;
    while pos < bytes.len() {
        let len = bytes[pos] as usize;
        pos += 1;
        if pos + len > bytes.len() {
            break;
        }
        let s = std::str::from_utf8(&bytes[pos..pos + len]).unwrap_or("");
        out.push(MetaData::parse(s));
        pos += len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let md = MetaData::parse("schema=Xform_v3;interpretation=xform");
        assert_eq!(md.get("schema"), Some("Xform_v3"));
        assert_eq!(md.get("interpretation"), Some("xform"));
        assert_eq!(md.len(), 2);
    }

    #[test]
    fn test_parse_skips_malformed() {
        let md = MetaData::parse("justakey;schema=Foo;=novaluekey");
        assert_eq!(md.len(), 1);
        assert_eq!(md.get("schema"), Some("Foo"));
    }

    #[test]
    fn test_parse_last_key_wins() {
        let md = MetaData::parse("a=1;a=2");
        assert_eq!(md.get("a"), Some("2"));
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut md = MetaData::new();
        md.set("schema", "Xform_v3");
        md.set("interpretation", "xform");
        let s = md.serialize();
        let back = MetaData::parse(&s);
        assert_eq!(md, back);
    }

    #[test]
    fn test_set_get_remove() {
        let mut md = MetaData::new();
        assert!(md.is_empty());
        md.set("k", "v1");
        assert_eq!(md.get("k"), Some("v1"));
        md.set("k", "v2");
        assert_eq!(md.get("k"), Some("v2"));
        assert_eq!(md.len(), 1);
        assert!(md.remove("k"));
        assert!(!md.contains("k"));
    }
}
