//! Data type representations for stored values.

pub mod sorted_set;

use bytes::Bytes;

use sorted_set::SortedSet;

/// A stored value in the keyspace.
///
/// Strings use `Bytes` for cheap cloning; sorted sets are boxed so the
/// common string case stays small and a large set can be shipped to the
/// drop pool as a single pointer.
#[derive(Debug)]
pub enum Value {
    /// Binary-safe string data.
    String(Bytes),

    /// Sorted set of unique members, each with a float score, ordered
    /// by (score, member name).
    SortedSet(Box<SortedSet>),
}

/// Returns the type name for a value, used in logs.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::SortedSet(_) => "zset",
    }
}
