//! Response validation.
//!
//! Validation failures are surfaced to the caller immediately and never
//! retried; they carry the violated rule so the client can explain the
//! rejection.

use serde_json::Value;

use proctor_core::error::SessionError;
use proctor_core::map::TestMap;
use proctor_core::tags::Tag;

/// True when a submitted response carries no answer at all.
pub fn is_empty_response(response: Option<&Value>) -> bool {
    match response {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty() || o.values().all(|v| is_empty_response(Some(v))),
        Some(_) => false,
    }
}

/// Reject an empty response when the item disallows skipping.
pub fn ensure_response_allowed(
    map: &TestMap,
    item: &Tag,
    response: Option<&Value>,
) -> Result<(), SessionError> {
    let allow_skipping = map.item_def(item).map(|i| i.allow_skipping).unwrap_or(true);
    if !allow_skipping && is_empty_response(response) {
        return Err(SessionError::EmptyResponseNotAllowed(item.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::map::{ItemDef, PartDef, SectionDef, TestMap};

    fn map_with_mandatory_item() -> TestMap {
        TestMap {
            id: Tag::new("test-x"),
            label: String::new(),
            time_limits: None,
            extra_time_ms: 0,
            parts: vec![PartDef {
                id: Tag::new("part-1"),
                navigation_mode: Default::default(),
                time_limits: None,
                sections: vec![SectionDef {
                    id: Tag::new("section-A"),
                    label: String::new(),
                    time_limits: None,
                    items: vec![ItemDef {
                        id: Tag::new("item-1"),
                        label: String::new(),
                        categories: vec![],
                        time_limits: None,
                        allow_skipping: false,
                    }],
                }],
            }],
        }
    }

    #[test]
    fn emptiness() {
        assert!(is_empty_response(None));
        assert!(is_empty_response(Some(&Value::Null)));
        assert!(is_empty_response(Some(&serde_json::json!(""))));
        assert!(is_empty_response(Some(&serde_json::json!("   "))));
        assert!(is_empty_response(Some(&serde_json::json!([]))));
        assert!(is_empty_response(Some(&serde_json::json!({"RESPONSE": null}))));
        assert!(!is_empty_response(Some(&serde_json::json!("B"))));
        assert!(!is_empty_response(Some(&serde_json::json!({"RESPONSE": "B"}))));
        assert!(!is_empty_response(Some(&serde_json::json!(0))));
    }

    #[test]
    fn mandatory_item_rejects_empty() {
        let map = map_with_mandatory_item();
        let item = Tag::new("item-1");
        let err = ensure_response_allowed(&map, &item, None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("does not allow skipping"));

        let answer = serde_json::json!({"RESPONSE": "B"});
        assert!(ensure_response_allowed(&map, &item, Some(&answer)).is_ok());
    }

    #[test]
    fn unknown_item_is_permissive() {
        let map = map_with_mandatory_item();
        assert!(ensure_response_allowed(&map, &Tag::new("item-9"), None).is_ok());
    }
}
