use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use listing_core_types::DraftId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::variations::VariationSet;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft json invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("draft invalid: {0}")]
    Invalid(String),
}

/// Listing handed over by the product-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListingDraft {
    #[serde(default)]
    pub draft_id: Option<DraftId>,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<ImageSource>,
    #[serde(default)]
    pub condition: Option<String>,
    /// Required item attributes (name -> value).
    #[serde(default, alias = "itemSpecifics", alias = "attributes")]
    pub specifics: BTreeMap<String, String>,
    #[serde(default)]
    pub variations: Option<VariationSet>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl ProductListingDraft {
    pub fn from_json(raw: &str) -> Result<Self, DraftError> {
        let draft: Self = serde_json::from_str(raw)?;
        draft.validate()?;
        Ok(draft)
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::Invalid("title is empty".into()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DraftError::Invalid(format!("price {} out of range", self.price)));
        }
        Ok(())
    }

    /// True when the draft carries a variation set the builder should drive.
    pub fn has_variations(&self) -> bool {
        self.variations
            .as_ref()
            .map(|set| set.has_variations && !set.axes.is_empty())
            .unwrap_or(false)
    }

    /// Price rendered the way text inputs expect it.
    pub fn price_text(&self) -> String {
        format_price(self.price)
    }

    pub fn image_urls(&self) -> Vec<String> {
        self.images
            .iter()
            .filter_map(|image| match image {
                ImageSource::Url(url) => Some(url.clone()),
                ImageSource::Inline(_) => None,
            })
            .collect()
    }
}

/// One listing photo: a source url or an already fetched binary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    Url(String),
    Inline(InlineImage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub file_name: String,
    #[serde(default = "default_mime")]
    pub mime: String,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub data: Vec<u8>,
}

fn default_mime() -> String {
    "image/jpeg".to_string()
}

fn encode_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&Base64.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let payload = raw
        .split_once(";base64,")
        .map(|(_, data)| data)
        .unwrap_or(&raw);
    Base64.decode(payload).map_err(serde::de::Error::custom)
}

/// Formats a price with two decimals and no grouping.
pub fn format_price(value: f64) -> String {
    format!("{:.2}", round_cents(value))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses user-facing price text ("$1,299.00", "12,5") into a number.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (None, Some(comma)) if cleaned.len() - comma <= 3 => cleaned.replace(',', "."),
        _ => cleaned.replace(',', ""),
    };
    normalized.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_draft_with_inline_image() {
        let raw = r#"{
            "title": "Canvas tote",
            "price": 19.5,
            "images": ["https://cdn.example.com/a.jpg", {"fileName": "b.png", "data": "aGVsbG8="}],
            "itemSpecifics": {"Brand": "Acme"}
        }"#;
        let draft = ProductListingDraft::from_json(raw).unwrap();
        assert_eq!(draft.images.len(), 2);
        assert_eq!(draft.image_urls(), vec!["https://cdn.example.com/a.jpg".to_string()]);
        match &draft.images[1] {
            ImageSource::Inline(image) => assert_eq!(image.data, b"hello"),
            other => panic!("unexpected image {other:?}"),
        }
        assert_eq!(draft.specifics.get("Brand").map(String::as_str), Some("Acme"));
        assert_eq!(draft.price_text(), "19.50");
        assert!(!draft.has_variations());
    }

    #[test]
    fn rejects_blank_title() {
        let raw = r#"{"title": "  ", "price": 3}"#;
        assert!(matches!(
            ProductListingDraft::from_json(raw),
            Err(DraftError::Invalid(_))
        ));
    }

    #[test]
    fn parses_localized_prices() {
        assert_eq!(parse_price("$1,299.00"), Some(1299.0));
        assert_eq!(parse_price("12,50 €"), Some(12.5));
        assert_eq!(parse_price("1.299,90"), Some(1299.9));
        assert_eq!(parse_price("n/a"), None);
    }
}
