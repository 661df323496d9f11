//! Core types for locator system

use action_primitives::{DocumentId, ElementInfo, ElementRef};
use serde::{Deserialize, Serialize};

/// Locator strategy enumeration, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// name / id / test-id attributes
    Attribute,

    /// aria-label and aria-labelledby
    AriaLabel,

    /// placeholder text
    Placeholder,

    /// Known structural constraint (fixed maxlength, input type)
    Structural,

    /// Walk from a visible label to the control it describes
    LabelProximity,

    /// Visible text content
    Text,

    /// Element signature remembered from an earlier run
    Remembered,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Attribute => "attribute",
            LocatorStrategy::AriaLabel => "aria-label",
            LocatorStrategy::Placeholder => "placeholder",
            LocatorStrategy::Structural => "structural",
            LocatorStrategy::LabelProximity => "label-proximity",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Remembered => "remembered",
        }
    }

    /// Get all cascade strategies in fallback order
    pub fn fallback_chain() -> Vec<LocatorStrategy> {
        vec![
            LocatorStrategy::Attribute,
            LocatorStrategy::AriaLabel,
            LocatorStrategy::Placeholder,
            LocatorStrategy::Structural,
            LocatorStrategy::LabelProximity,
            LocatorStrategy::Text,
        ]
    }
}

/// Broad class of control a target must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    TextEntry,
    /// Select, listbox, combobox or a typeahead text field
    Choice,
    File,
    Button,
    Toggle,
    Any,
}

impl ControlKind {
    pub fn accepts(&self, info: &ElementInfo) -> bool {
        if info.input_type() == Some("hidden") {
            return false;
        }
        match self {
            ControlKind::TextEntry => info.is_text_entry(),
            ControlKind::Choice => {
                info.is_tag("select")
                    || matches!(info.role(), Some("combobox") | Some("listbox"))
                    || info.is_text_entry()
            }
            ControlKind::File => info.input_type() == Some("file"),
            ControlKind::Button => {
                info.is_tag("button")
                    || info.is_tag("a")
                    || matches!(info.input_type(), Some("submit") | Some("button"))
                    || info.role() == Some("button")
            }
            ControlKind::Toggle => {
                matches!(info.input_type(), Some("checkbox") | Some("radio"))
                    || matches!(info.role(), Some("switch") | Some("checkbox"))
            }
            ControlKind::Any => true,
        }
    }
}

/// Hints describing one control, consumed by every strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub kind: ControlKind,
    /// Matched against name, id, data-testid and autocomplete.
    #[serde(default)]
    pub name_hints: Vec<String>,
    /// Accessible-label and visible-label texts.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub placeholders: Vec<String>,
    /// Visible text of the control itself (buttons, chips).
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
}

impl TargetSpec {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            name_hints: Vec::new(),
            labels: Vec::new(),
            placeholders: Vec::new(),
            texts: Vec::new(),
            max_length: None,
        }
    }

    pub fn names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.name_hints.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn placeholders<S: Into<String>>(mut self, texts: impl IntoIterator<Item = S>) -> Self {
        self.placeholders.extend(texts.into_iter().map(Into::into));
        self
    }

    pub fn texts<S: Into<String>>(mut self, texts: impl IntoIterator<Item = S>) -> Self {
        self.texts.extend(texts.into_iter().map(Into::into));
        self
    }

    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name_hints.is_empty()
            && self.labels.is_empty()
            && self.placeholders.is_empty()
            && self.texts.is_empty()
            && self.max_length.is_none()
            && self.kind != ControlKind::File
    }
}

/// What the caller is looking for, in page-independent terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "target", content = "arg")]
pub enum SemanticTarget {
    TitleInput,
    PriceInput,
    QuantityInput,
    DescriptionEditor,
    ConditionSelect,
    PhotoInput,
    SubmitButton,
    /// A button by its visible labels.
    Button(Vec<String>),
    /// The input for an item attribute, by attribute name.
    AttributeField(String),
    Custom(TargetSpec),
}

impl SemanticTarget {
    pub fn button<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        SemanticTarget::Button(labels.into_iter().map(Into::into).collect())
    }

    /// Stable key for remembered anchors.
    pub fn key(&self) -> String {
        match self {
            SemanticTarget::TitleInput => "title".into(),
            SemanticTarget::PriceInput => "price".into(),
            SemanticTarget::QuantityInput => "quantity".into(),
            SemanticTarget::DescriptionEditor => "description".into(),
            SemanticTarget::ConditionSelect => "condition".into(),
            SemanticTarget::PhotoInput => "photos".into(),
            SemanticTarget::SubmitButton => "submit".into(),
            SemanticTarget::Button(labels) => format!("button:{}", labels.join("|").to_lowercase()),
            SemanticTarget::AttributeField(name) => format!("attribute:{}", name.to_lowercase()),
            SemanticTarget::Custom(spec) => format!(
                "custom:{}:{}",
                spec.name_hints.join("|"),
                spec.labels.join("|")
            )
            .to_lowercase(),
        }
    }

    pub fn spec(&self) -> TargetSpec {
        match self {
            SemanticTarget::TitleInput => TargetSpec::new(ControlKind::TextEntry)
                .names(["title", "itemTitle"])
                .labels(["Title", "Item title", "Listing title"])
                .placeholders(["title"])
                .max_length(80),
            SemanticTarget::PriceInput => TargetSpec::new(ControlKind::TextEntry)
                .names(["price", "binPrice", "startPrice"])
                .labels(["Price", "Buy It Now price", "Item price"])
                .placeholders(["price", "0.00"]),
            SemanticTarget::QuantityInput => TargetSpec::new(ControlKind::TextEntry)
                .names(["quantity", "qty"])
                .labels(["Quantity", "Available quantity"])
                .placeholders(["quantity"]),
            SemanticTarget::DescriptionEditor => TargetSpec::new(ControlKind::TextEntry)
                .names(["description", "itemDescription"])
                .labels(["Description", "Item description"])
                .placeholders(["describe", "description"]),
            SemanticTarget::ConditionSelect => TargetSpec::new(ControlKind::Choice)
                .names(["condition", "itemCondition", "conditionId"])
                .labels(["Condition", "Item condition"]),
            SemanticTarget::PhotoInput => TargetSpec::new(ControlKind::File)
                .names(["photos", "images", "upload"])
                .labels(["Photos", "Add photos", "Upload photos"]),
            SemanticTarget::SubmitButton => TargetSpec::new(ControlKind::Button)
                .names(["submit", "listItem", "list-it"])
                .labels(["List it", "List item", "Submit listing"])
                .texts(["List it", "List item", "Submit", "Publish"]),
            SemanticTarget::Button(labels) => TargetSpec::new(ControlKind::Button)
                .labels(labels.iter().cloned())
                .texts(labels.iter().cloned()),
            SemanticTarget::AttributeField(name) => TargetSpec::new(ControlKind::Choice)
                .names([name.clone(), format!("attributes.{}", name)])
                .labels([name.clone()])
                .placeholders([name.clone()]),
            SemanticTarget::Custom(spec) => spec.clone(),
        }
    }
}

/// Element candidate for locator resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub element: ElementRef,

    /// Strategy used to find this candidate
    pub strategy: LocatorStrategy,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    /// Additional metadata about the match
    pub metadata: CandidateMetadata,
}

impl Candidate {
    pub fn new(info: &ElementInfo, strategy: LocatorStrategy, confidence: f64) -> Self {
        Self {
            element: info.element.clone(),
            strategy,
            confidence,
            metadata: CandidateMetadata::from_info(info),
        }
    }

    /// Check if this is a high-confidence match (>= 0.8)
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.8
    }

    pub fn is_actionable(&self) -> bool {
        self.metadata.is_visible && self.metadata.is_enabled
    }
}

/// Candidate metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub tag_name: String,
    pub visible_text: Option<String>,
    pub aria_label: Option<String>,
    /// Position in the flattened document order
    pub flat_index: usize,
    pub is_visible: bool,
    pub is_enabled: bool,
}

impl CandidateMetadata {
    fn from_info(info: &ElementInfo) -> Self {
        Self {
            tag_name: info.tag.clone(),
            visible_text: (!info.text.is_empty()).then(|| info.text.clone()),
            aria_label: info.attr("aria-label").map(str::to_string),
            flat_index: info.dom_index,
            is_visible: info.visible,
            is_enabled: info.enabled,
        }
    }
}

/// Where to look and what to prefer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocateScope {
    /// Only these documents (all readable ones when empty).
    #[serde(default)]
    pub documents: Vec<DocumentId>,
    /// Only descendants of this element.
    #[serde(default)]
    pub within: Option<ElementRef>,
    /// Previously found element; ties go to the candidate nearest to it.
    #[serde(default)]
    pub anchor: Option<ElementRef>,
}

impl LocateScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn document(doc: DocumentId) -> Self {
        Self {
            documents: vec![doc],
            ..Self::default()
        }
    }

    pub fn within(el: ElementRef) -> Self {
        Self {
            within: Some(el),
            ..Self::default()
        }
    }

    pub fn near(mut self, anchor: ElementRef) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Result of a successful resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub element: ElementRef,
    pub info: ElementInfo,
    pub strategy: LocatorStrategy,
    pub confidence: f64,
    /// Candidates the winning strategy produced.
    pub candidate_count: usize,
}
