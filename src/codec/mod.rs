//! Structured value <-> tree codec
//!
//! Features describe their state as plain structured values
//! (`serde_json::Value`, or any `Serialize` type) and the codec lays it out
//! as an [`Element`] that can be grafted into a container.
//!
//! # Layout
//!
//! For each property of a record, in order of precedence:
//!
//! 1. properties in `attribute_props` become attributes of the record node;
//! 2. arrays become one child per item, all sharing the item tag;
//! 3. records recurse into a child tagged with the (renamed) property;
//! 4. scalars become a leaf child tagged with the (renamed) property;
//! 5. a node with no children and no attributes is a bare scalar.
//!
//! Decoding is the inverse. A registered array-item tag always decodes to a
//! list, even with a single item, so `[x]` survives a round trip as `[x]`.
//! Attributes that are not in `attribute_props` still decode as properties.

mod options;

pub use options::{CodecOptions, DEFAULT_ITEM_TAG};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::tree::{Element, Scalar};

/// Encode `value` as an element named `name`
pub fn encode(name: &str, value: &Value, options: &CodecOptions) -> Element {
    match value {
        Value::Object(map) => encode_record(name, map, options),
        Value::Array(items) => {
            let tag = options.item_tag_for(name);
            let mut element = Element::new(name);
            for item in items {
                element.children.push(encode(&tag, item, options));
            }
            element
        }
        Value::Null => Element::new(name),
        scalar => Element {
            name: name.to_string(),
            value: Scalar::from_json(scalar),
            ..Default::default()
        },
    }
}

fn encode_record(name: &str, map: &Map<String, Value>, options: &CodecOptions) -> Element {
    let mut element = Element::new(name);
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        if options.attribute_props.contains(key) {
            let attr = Scalar::from_json(value).unwrap_or_else(|| Scalar::Str(value.to_string()));
            element.attributes.insert(key.clone(), attr);
            continue;
        }
        match value {
            Value::Array(items) => {
                let tag = options.item_tag_for(key);
                for item in items {
                    element.children.push(encode(&tag, item, options));
                }
            }
            other => element.children.push(encode(&options.tag_for(key), other, options)),
        }
    }
    element
}

/// Decode an element back into a structured value
pub fn decode(element: &Element, options: &CodecOptions) -> Value {
    if element.children.is_empty() && element.attributes.is_empty() {
        return match &element.value {
            Some(scalar) => scalar_json(scalar, options),
            None => Value::Object(Map::new()),
        };
    }

    let mut record = Map::new();
    for (key, attr) in &element.attributes {
        record.insert(key.clone(), scalar_json(attr, options));
    }

    // property -> (registered array tag?, decoded values in child order)
    let mut grouped: BTreeMap<String, (bool, Vec<Value>)> = BTreeMap::new();
    for child in &element.children {
        let (property, is_array) = options.property_for(&child.name);
        let entry = grouped.entry(property).or_insert((is_array, Vec::new()));
        entry.1.push(decode(child, options));
    }
    for (property, (is_array, mut values)) in grouped {
        let value = if is_array || values.len() > 1 {
            Value::Array(values)
        } else {
            values.pop().unwrap_or(Value::Null)
        };
        record.insert(property, value);
    }
    Value::Object(record)
}

fn scalar_json(scalar: &Scalar, options: &CodecOptions) -> Value {
    if options.retype_strings {
        scalar.retyped().to_json()
    } else {
        scalar.to_json()
    }
}

/// Encode any serializable value
pub fn encode_from<T: Serialize>(name: &str, value: &T, options: &CodecOptions) -> Result<Element> {
    let json = serde_json::to_value(value)?;
    Ok(encode(name, &json, options))
}

/// Decode into a typed value.
///
/// Stored scalar types are tried first, so a `String` field holding `"1"`
/// stays a string. Retyping is only used when that shape is rejected, which
/// covers leaves written as text by older clients.
pub fn decode_as<T: DeserializeOwned>(element: &Element, options: &CodecOptions) -> Result<T> {
    let stored = options.clone().without_retyping();
    match serde_json::from_value(decode(element, &stored)) {
        Ok(value) => Ok(value),
        Err(e) if options.retype_strings => {
            log::trace!("Stored shape of {} rejected ({}); retrying with retyping", element.name, e);
            Ok(serde_json::from_value(decode(element, options))?)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn sheet_options() -> CodecOptions {
        CodecOptions::new()
            .rename("hitPoints", "hp")
            .array_items("items", "item")
            .array_items("skills", "skill")
            .attribute("id")
    }

    #[test]
    fn test_encode_layout() {
        let value = json!({
            "id": "pc-1",
            "name": "Aria",
            "hitPoints": 12,
            "skills": ["stealth", "arcana"],
        });
        let element = encode("character", &value, &sheet_options());

        assert_eq!(element.name, "character");
        assert_eq!(element.attributes.get("id"), Some(&Scalar::string("pc-1")));
        assert_eq!(element.child("hp").and_then(|c| c.value.clone()), Some(Scalar::int(12)));
        let skills: Vec<_> = element.children.iter().filter(|c| c.name == "skill").collect();
        assert_eq!(skills.len(), 2);
        assert!(element.child("id").is_none());
    }

    #[test]
    fn test_round_trip_nested() {
        let value = json!({
            "id": "pc-1",
            "name": "Aria",
            "hitPoints": 12,
            "alive": true,
            "speed": 7.5,
            "stats": { "str": 10, "dex": 14 },
            "skills": ["stealth", "arcana"],
            "items": [ { "name": "rope", "weight": 2 }, { "name": "torch", "weight": 1 } ],
        });
        let options = sheet_options();
        assert_eq!(decode(&encode("root", &value, &options), &options), value);
    }

    #[test]
    fn test_single_element_array_stays_a_list() {
        let value = json!({ "skills": ["stealth"] });
        let options = sheet_options();
        assert_eq!(decode(&encode("root", &value, &options), &options), value);
    }

    #[test]
    fn test_unregistered_repeated_tags_become_lists() {
        let element = Element::new("root")
            .with_child(Element::leaf("tag", Scalar::string("a")))
            .with_child(Element::leaf("tag", Scalar::string("b")));
        assert_eq!(decode(&element, &CodecOptions::new()), json!({ "tag": ["a", "b"] }));
    }

    #[test]
    fn test_unregistered_array_decodes_under_item_tag() {
        let options = CodecOptions::new();
        let element = encode("root", &json!({ "tags": ["a", "b"] }), &options);
        assert_eq!(element.children.iter().filter(|c| c.name == "item").count(), 2);
        assert_eq!(decode(&element, &options), json!({ "item": ["a", "b"] }));

        let options = options.array_items("tags", "tag");
        let element = encode("root", &json!({ "tags": ["a"] }), &options);
        assert_eq!(decode(&element, &options), json!({ "tags": ["a"] }));
    }

    #[test]
    fn test_scalar_retyping() {
        let element = Element::new("root")
            .with_child(Element::leaf("flag", Scalar::string("true")))
            .with_child(Element::leaf("count", Scalar::string("3")))
            .with_child(Element::leaf("label", Scalar::string("three")));
        assert_eq!(
            decode(&element, &CodecOptions::new()),
            json!({ "flag": true, "count": 3, "label": "three" })
        );
        assert_eq!(
            decode(&element, &CodecOptions::new().without_retyping()),
            json!({ "flag": "true", "count": "3", "label": "three" })
        );
    }

    #[test]
    fn test_unknown_attributes_are_preserved() {
        let element = Element::new("root")
            .with_attribute("schemaVersion", Scalar::int(2))
            .with_child(Element::leaf("name", Scalar::string("Aria")));
        assert_eq!(
            decode(&element, &CodecOptions::new()),
            json!({ "schemaVersion": 2, "name": "Aria" })
        );
    }

    #[test]
    fn test_empty_record_and_nulls() {
        let value = json!({ "notes": {}, "portrait": null });
        let decoded = decode(&encode("root", &value, &CodecOptions::new()), &CodecOptions::new());
        assert_eq!(decoded, json!({ "notes": {} }));
    }

    #[test]
    fn test_bare_scalar() {
        let element = encode("round", &json!(4), &CodecOptions::new());
        assert_eq!(element, Element::leaf("round", Scalar::int(4)));
        assert_eq!(decode(&element, &CodecOptions::new()), json!(4));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Token {
        id: String,
        label: String,
        hit_points: i64,
        conditions: Vec<String>,
        #[serde(default)]
        note: Option<String>,
    }

    #[test]
    fn test_typed_round_trip() {
        let token = Token {
            id: "t-7".to_string(),
            label: "Goblin".to_string(),
            hit_points: 7,
            conditions: vec!["prone".to_string()],
            note: None,
        };
        let options = CodecOptions::new()
            .attribute("id")
            .array_items("conditions", "condition");
        let element = encode_from("token", &token, &options).unwrap();
        let back: Token = decode_as(&element, &options).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_typed_round_trip_keeps_numeric_looking_strings() {
        let token = Token {
            id: "42".to_string(),
            label: "true".to_string(),
            hit_points: 3,
            conditions: vec!["1".to_string(), "2.5".to_string()],
            note: Some("7".to_string()),
        };
        let options = CodecOptions::new()
            .attribute("id")
            .array_items("conditions", "condition");
        let element = encode_from("token", &token, &options).unwrap();
        let back: Token = decode_as(&element, &options).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_typed_decode_retypes_text_leaves() {
        let element = Element::new("token")
            .with_attribute("id", Scalar::string("t-1"))
            .with_child(Element::leaf("label", Scalar::string("Orc")))
            .with_child(Element::leaf("hitPoints", Scalar::string("15")))
            .with_child(Element::leaf("condition", Scalar::string("dazed")));
        let options = CodecOptions::new()
            .attribute("id")
            .array_items("conditions", "condition");
        let token: Token = decode_as(&element, &options).unwrap();
        assert_eq!(token.hit_points, 15);
        assert!(decode_as::<Token>(&element, &options.clone().without_retyping()).is_err());
    }

    #[test]
    fn test_typed_decode_reports_shape_mismatch() {
        let element = Element::leaf("token", Scalar::string("not a record"));
        let result: Result<Token> = decode_as(&element, &CodecOptions::new());
        assert!(result.is_err());
    }
}
