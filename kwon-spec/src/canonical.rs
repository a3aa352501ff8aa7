//! Canonical JSON: sorted keys, compact separators, UTF-8,
//! non-ASCII left unescaped. `serde_json::Value` objects are backed by a
//! `BTreeMap` in this workspace (the `preserve_order` feature is never
//! enabled), so `to_string` already yields sorted keys with compact
//! separators; this module exists so call sites have one obvious name for
//! the operation instead of reaching for `serde_json::to_string` directly.

use serde_json::Value;

/// Serialize `value` as canonical JSON.
pub fn canonical_json(value: &Value) -> String {
 serde_json::to_string(value).expect("Value serialization is infallible")
}

/// Build the canonical JSON for a fixed string-keyed field subset.
pub fn canonical_json_of_fields(fields: &[(&str, String)]) -> String {
 let map: std::collections::BTreeMap<&str, String> = fields.iter().cloned().collect();
 let value = serde_json::to_value(map).expect("string map always serializes");
 canonical_json(&value)
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn keys_are_sorted_and_compact() {
 let v = serde_json::json!({"b": 1, "a": 2});
 assert_eq!(canonical_json(&v), r#"{"a":2,"b":1}"#);
 }

 #[test]
 fn non_ascii_is_preserved() {
 let v = serde_json::json!({"name": "신한은행"});
 assert_eq!(canonical_json(&v), r#"{"name":"신한은행"}"#);
 }

 #[test]
 fn field_subset_matches_expected_shape() {
 let s = canonical_json_of_fields(&[("hash", "0xAA".into()), ("value", "100".into())]);
 assert_eq!(s, r#"{"hash":"0xAA","value":"100"}"#);
 }
}
