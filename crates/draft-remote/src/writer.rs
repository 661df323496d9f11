//! Structured remote writes with alternate payload shapes.
//!
//! The draft schema is not under our control and differs between listing
//! flows, so each field carries several candidate shapes. A write re-reads the
//! draft first and skips the PUT when the value is already there, then tries
//! shapes in order and only reports success once a re-read shows the value.

use std::sync::Arc;

use listing_core_types::DraftId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::api::DraftApi;
use crate::errors::{RemoteError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum RemoteField {
    Title(String),
    Price(f64),
    Description(String),
    Condition(String),
    Quantity(u32),
    Pictures(Vec<String>),
    Specific { name: String, value: String },
    Ended(bool),
}

/// One candidate payload plus where its value lands in the draft.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadShape {
    pub patch: Value,
    pub pointer: String,
    pub expected: Value,
}

impl PayloadShape {
    fn flat(key: &str, value: Value) -> Self {
        Self {
            patch: json!({ key: value.clone() }),
            pointer: format!("/{}", escape_pointer(key)),
            expected: value,
        }
    }

    fn nested(outer: &str, inner: &str, value: Value) -> Self {
        Self {
            patch: json!({ outer: { inner: value.clone() } }),
            pointer: format!("/{}/{}", escape_pointer(outer), escape_pointer(inner)),
            expected: value,
        }
    }

    pub fn key(&self) -> &str {
        &self.pointer
    }

    fn is_reflected_in(&self, draft: &Value) -> bool {
        draft
            .pointer(&self.pointer)
            .is_some_and(|found| lenient_eq(found, &self.expected))
    }
}

impl RemoteField {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteField::Title(_) => "title",
            RemoteField::Price(_) => "price",
            RemoteField::Description(_) => "description",
            RemoteField::Condition(_) => "condition",
            RemoteField::Quantity(_) => "quantity",
            RemoteField::Pictures(_) => "images",
            RemoteField::Specific { .. } => "specifics",
            RemoteField::Ended(_) => "ended",
        }
    }

    /// Candidate payloads, most common schema first.
    pub fn shapes(&self) -> Vec<PayloadShape> {
        match self {
            RemoteField::Title(title) => vec![
                PayloadShape::flat("title", json!(title)),
                PayloadShape::flat("itemTitle", json!(title)),
                PayloadShape::nested("item", "title", json!(title)),
            ],
            RemoteField::Price(price) => vec![
                PayloadShape::flat("price", json!(price)),
                PayloadShape::nested("price", "value", json!(price)),
                PayloadShape::flat("startPrice", json!(price)),
                PayloadShape::nested("pricing", "price", json!(price)),
            ],
            RemoteField::Description(text) => vec![
                PayloadShape::flat("description", json!(text)),
                PayloadShape::flat("itemDescription", json!(text)),
                PayloadShape::nested("item", "description", json!(text)),
            ],
            RemoteField::Condition(condition) => vec![
                PayloadShape::flat("condition", json!(condition)),
                PayloadShape::flat("conditionId", json!(condition)),
                PayloadShape::nested("item", "condition", json!(condition)),
            ],
            RemoteField::Quantity(quantity) => vec![
                PayloadShape::flat("quantity", json!(quantity)),
                PayloadShape::flat("availableQuantity", json!(quantity)),
                PayloadShape::nested("item", "quantity", json!(quantity)),
            ],
            RemoteField::Pictures(urls) => vec![
                PayloadShape::flat("pictures", json!(urls)),
                PayloadShape::flat("pictureUrls", json!(urls)),
                PayloadShape::nested("item", "pictureUrls", json!(urls)),
            ],
            RemoteField::Specific { name, value } => vec![
                PayloadShape::nested("itemSpecifics", name, json!([value])),
                PayloadShape::nested("specifics", name, json!(value)),
                PayloadShape::nested("aspects", name, json!([value])),
            ],
            RemoteField::Ended(ended) => vec![
                PayloadShape::flat("ended", json!(ended)),
                PayloadShape::flat("status", json!(if *ended { "ENDED" } else { "ACTIVE" })),
                PayloadShape::nested("listing", "ended", json!(ended)),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The draft already held the value; nothing was sent.
    AlreadyPresent { key: String },
    Written { key: String, shapes_tried: usize },
}

impl WriteOutcome {
    pub fn key(&self) -> &str {
        match self {
            WriteOutcome::AlreadyPresent { key } | WriteOutcome::Written { key, .. } => key,
        }
    }
}

#[derive(Clone)]
pub struct RemoteFieldWriter {
    api: Arc<dyn DraftApi>,
}

impl RemoteFieldWriter {
    pub fn new(api: Arc<dyn DraftApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn DraftApi> {
        &self.api
    }

    pub async fn write(&self, id: &DraftId, field: &RemoteField) -> Result<WriteOutcome> {
        let shapes = field.shapes();
        let current = self.api.get_draft(id).await?;
        if let Some(shape) = shapes.iter().find(|shape| shape.is_reflected_in(&current)) {
            debug!(draft = %id, field = field.name(), key = %shape.pointer, "value already present");
            return Ok(WriteOutcome::AlreadyPresent {
                key: shape.pointer.clone(),
            });
        }

        let mut last = String::from("no payload shape");
        for (index, shape) in shapes.iter().enumerate() {
            match self.api.put_draft(id, shape.patch.clone()).await {
                Ok(()) => {}
                Err(RemoteError::NotFound(missing)) => return Err(RemoteError::NotFound(missing)),
                Err(err) => {
                    debug!(draft = %id, field = field.name(), key = %shape.pointer, "payload shape failed: {}", err);
                    last = err.to_string();
                    continue;
                }
            }
            let reread = self.api.get_draft(id).await?;
            if shape.is_reflected_in(&reread) {
                info!(draft = %id, field = field.name(), key = %shape.pointer, "remote write verified");
                return Ok(WriteOutcome::Written {
                    key: shape.pointer.clone(),
                    shapes_tried: index + 1,
                });
            }
            last = format!("{} accepted but not reflected on re-read", shape.pointer);
        }

        warn!(draft = %id, field = field.name(), "every payload shape failed: {}", last);
        Err(RemoteError::Exhausted {
            field: field.name().to_string(),
            last,
        })
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Loose equality for values echoed back by the draft API: numbers may come
/// back as strings, text may be re-cased or padded, single values may be
/// wrapped in one-element lists.
pub fn lenient_eq(found: &Value, expected: &Value) -> bool {
    match (found, expected) {
        (Value::Array(found), Value::Array(expected)) => {
            found.len() == expected.len() && found.iter().zip(expected).all(|(a, b)| lenient_eq(a, b))
        }
        (Value::Array(found), scalar) if found.len() == 1 => lenient_eq(&found[0], scalar),
        (scalar, Value::Array(expected)) if expected.len() == 1 => lenient_eq(scalar, &expected[0]),
        (Value::Object(found), expected) => object_value(found).is_some_and(|inner| lenient_eq(inner, expected)),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (found, expected) => match (as_number(found), as_number(expected)) {
            (Some(a), Some(b)) => (a - b).abs() < 0.005,
            _ => match (found.as_str(), expected.as_str()) {
                (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
                _ => false,
            },
        },
    }
}

fn object_value(object: &Map<String, Value>) -> Option<&Value> {
    object.get("value").or_else(|| object.get("url"))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryDraftApi;

    fn setup(draft: Value, rejecting: &[&str]) -> (Arc<InMemoryDraftApi>, RemoteFieldWriter, DraftId) {
        let id = DraftId("d-1".into());
        let api = Arc::new(InMemoryDraftApi::new().rejecting(rejecting.iter().copied()));
        api.insert(&id, draft);
        let writer = RemoteFieldWriter::new(api.clone());
        (api, writer, id)
    }

    #[tokio::test]
    async fn skips_put_when_value_already_present() {
        let (_, writer, id) = setup(json!({"price": "12.50"}), &[]);
        let outcome = writer.write(&id, &RemoteField::Price(12.5)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyPresent { key: "/price".into() });
    }

    #[tokio::test]
    async fn falls_back_to_alternate_key() {
        let (api, writer, id) = setup(json!({}), &["title"]);
        let outcome = writer.write(&id, &RemoteField::Title("Blue Mug".into())).await.unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Written {
                key: "/itemTitle".into(),
                shapes_tried: 2
            }
        );
        assert_eq!(api.snapshot(&id).unwrap()["itemTitle"], "Blue Mug");
    }

    #[tokio::test]
    async fn specifics_use_list_shape() {
        let (api, writer, id) = setup(json!({"itemSpecifics": {"Brand": ["Acme"]}}), &[]);
        writer
            .write(
                &id,
                &RemoteField::Specific {
                    name: "Color".into(),
                    value: "Red".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            api.snapshot(&id).unwrap()["itemSpecifics"],
            json!({"Brand": ["Acme"], "Color": ["Red"]})
        );
    }

    #[tokio::test]
    async fn exhausted_when_every_shape_rejected() {
        let (_, writer, id) = setup(json!({}), &["condition", "conditionId", "item"]);
        let err = writer.write(&id, &RemoteField::Condition("New".into())).await.unwrap_err();
        assert!(matches!(err, RemoteError::Exhausted { ref field, .. } if field == "condition"));
    }

    #[tokio::test]
    async fn missing_draft_is_reported() {
        let api = Arc::new(InMemoryDraftApi::new());
        let writer = RemoteFieldWriter::new(api);
        let err = writer
            .write(&DraftId("nope".into()), &RemoteField::Quantity(3))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn lenient_comparisons() {
        assert!(lenient_eq(&json!("12.5"), &json!(12.5)));
        assert!(lenient_eq(&json!({"value": 3}), &json!(3)));
        assert!(lenient_eq(&json!([" red "]), &json!("Red")));
        assert!(!lenient_eq(&json!(null), &json!("x")));
        assert!(!lenient_eq(&json!(["a", "b"]), &json!(["a"])));
    }
}
