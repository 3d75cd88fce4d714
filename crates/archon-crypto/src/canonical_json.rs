// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Deterministic canonical encoding of a JSON value (§4.1.1).
///
/// - Objects: keys are NFKC-normalized, then sorted lexicographically by
///   their normalized (and emitted) form.
/// - Arrays: element order is preserved; each element is canonicalized.
/// - Strings: emitted as standard JSON-escaped values (post NFKC
///   normalization, so two byte-distinct-but-equivalent strings hash the
///   same way).
/// - Numbers: emitted via `serde_json`'s own round-trip `Display`, which is
///   already the shortest representation `serde_json` itself would produce
///   on re-parse — frozen here as the canonical form rather than
///   reimplementing a float formatter.
/// - Booleans/null: literal `true`/`false`/`null`.
///
/// Calling this twice (i.e. parsing the output back into a `Value` and
/// canonicalizing again) is idempotent — see the `idempotent_on_reparse`
/// property test.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_canonical_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(String, &Value)> = map
                .iter()
                .map(|(k, v)| (normalize(k), v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_string(key, out);
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
    }
}

fn normalize(s: &str) -> String {
    s.nfkc().collect()
}

fn write_canonical_string(s: &str, out: &mut String) {
    // serde_json::Value's string Display already JSON-escapes correctly;
    // round-tripping through it keeps escaping logic in one well-tested place.
    let normalized = normalize(s);
    out.push_str(&Value::String(normalized).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_lexicographically() {
        let v = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(canonical_json(&v), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn key_reordering_does_not_change_output() {
        let a = json!({"x": 1, "y": {"b": 2, "a": 3}});
        let b = json!({"y": {"a": 3, "b": 2}, "x": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn arrays_preserve_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json(&v), "[3,1,2]");
    }

    #[test]
    fn literals_render_as_expected() {
        assert_eq!(canonical_json(&json!(null)), "null");
        assert_eq!(canonical_json(&json!(true)), "true");
        assert_eq!(canonical_json(&json!(false)), "false");
    }

    proptest! {
        #[test]
        fn idempotent_on_reparse(a in any::<i64>(), b in ".{0,12}") {
            let v = json!({"a": a, "b": b, "nested": {"z": 1, "y": 2}});
            let once = canonical_json(&v);
            let reparsed: Value = serde_json::from_str(&once).unwrap();
            let twice = canonical_json(&reparsed);
            prop_assert_eq!(once, twice);
        }
    }
}
