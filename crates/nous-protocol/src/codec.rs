//! Envelope codec.
//!
//! `serialize`/`deserialize` are the text round-trip used by stores.
//! `canonicalize` is the hashing and signing boundary: keys sorted
//! recursively, `,`/`:` separators with no whitespace, UTF-8 with non-ASCII
//! left unescaped. [`digest`] is the SHA-256 of that form.

use crate::envelope::EventEnvelope;
use crate::error::EventError;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical text of an envelope, independent of map insertion order.
pub fn canonicalize(envelope: &EventEnvelope) -> Result<String, EventError> {
    let value = serde_json::to_value(envelope)?;
    let mut out = String::with_capacity(512);
    write_canonical(&value, &mut out)?;
    Ok(out)
}

/// Canonical text of an arbitrary JSON value.
pub fn canonicalize_value(value: &Value) -> Result<String, EventError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), EventError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Text form of an envelope, preserving every field.
pub fn serialize(envelope: &EventEnvelope) -> Result<String, EventError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse an envelope. Corrupt, incomplete or unknown-field input is a
/// validation error.
pub fn deserialize(text: &str) -> Result<EventEnvelope, EventError> {
    serde_json::from_str(text).map_err(|e| EventError::Validation(e.to_string()))
}

/// Hex SHA-256 of the canonical form.
pub fn digest(envelope: &EventEnvelope) -> Result<String, EventError> {
    let canonical = canonicalize(envelope)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AgentRef, SignatureBlock, TraceContext};
    use crate::event::{DomainEvent, MemoryWritten};
    use proptest::prelude::*;
    use serde_json::{Map, json};

    fn sample() -> EventEnvelope {
        DomainEvent::from(MemoryWritten {
            key: "notes/ünïcode".into(),
            value_type: "text".into(),
            value: json!({"b": [1, 2, {"z": null, "a": true}], "a": "x"}),
            content_type: None,
            provider_id: Some("working".into()),
        })
        .to_envelope(
            &AgentRef::new("agent-1", "writer"),
            &TraceContext::root().child(),
            None,
            Some("flow-1".into()),
        )
        .unwrap()
    }

    #[test]
    fn canonical_form_is_compact_and_sorted() {
        let value = json!({"b": 1, "a": {"d": [3, {"y": 1, "x": 2}], "c": "é"}});
        let text = canonicalize_value(&value).unwrap();
        assert_eq!(text, r#"{"a":{"c":"é","d":[3,{"x":2,"y":1}]},"b":1}"#);
    }

    #[test]
    fn round_trip_preserves_nested_objects() {
        let envelope = sample().with_signature(SignatureBlock {
            algorithm: "ed25519".into(),
            public_key_id: "key-1".into(),
            signature: "c2ln".into(),
        });
        let text = serialize(&envelope).unwrap();
        assert_eq!(deserialize(&text).unwrap(), envelope);
    }

    #[test]
    fn canonical_text_round_trips_too() {
        let envelope = sample().with_ttl_ms(30_000).with_partition_key("p1");
        let text = canonicalize(&envelope).unwrap();
        assert_eq!(deserialize(&text).unwrap(), envelope);
    }

    #[test]
    fn deserialize_rejects_incomplete_record() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value.as_object_mut().unwrap().remove("producer");
        let err = deserialize(&value.to_string()).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("surprise".into(), json!(1));
        assert!(matches!(
            deserialize(&value.to_string()),
            Err(EventError::Validation(_))
        ));
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(matches!(
            deserialize("{\"event_id\": "),
            Err(EventError::Validation(_))
        ));
    }

    #[test]
    fn digest_is_stable_hex() {
        let envelope = sample();
        let a = digest(&envelope).unwrap();
        let b = digest(&envelope.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let other = digest(&envelope.with_metadata("k", json!(1))).unwrap();
        assert_ne!(a, other);
    }

    proptest! {
        #[test]
        fn canonical_form_ignores_insertion_order(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..16)
        ) {
            let base = sample();
            let forward: Map<String, Value> =
                entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let backward: Map<String, Value> =
                entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();

            let mut a = base.clone();
            a.payload = forward;
            let mut b = base;
            b.payload = backward;

            prop_assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
            prop_assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
        }

        #[test]
        fn serialize_round_trips(
            key in "\\PC{0,24}",
            text in "\\PC{0,64}",
            number in any::<i64>(),
            ttl in proptest::option::of(any::<u32>()),
            idem in proptest::option::of("[a-z0-9-]{1,16}"),
        ) {
            let mut envelope = sample();
            envelope.payload.insert(key.clone(), json!({"text": text, "n": number}));
            envelope.metadata.insert("origin".into(), json!(text));
            envelope.ttl_ms = ttl.map(u64::from);
            envelope.idempotency_key = idem;

            let decoded = deserialize(&serialize(&envelope).unwrap()).unwrap();
            prop_assert_eq!(decoded, envelope);
        }
    }
}
