//! Known axis shapes and their value vocabularies.

use serde::{Deserialize, Serialize};

use crate::normalize::axis_key;

/// Axis kinds the listing form handles best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisShape {
    Color,
    Size,
    Material,
    Style,
    Model,
}

const COLOR_NAMES: &[&str] = &["color", "colour", "colors", "colours", "shade"];
const SIZE_NAMES: &[&str] = &["size", "sizes", "sizing"];
const MATERIAL_NAMES: &[&str] = &["material", "materials", "fabric"];
const STYLE_NAMES: &[&str] = &["style", "styles", "design", "pattern"];
const MODEL_NAMES: &[&str] = &["model", "models", "version"];

const COLORS: &[&str] = &[
    "red", "blue", "green", "yellow", "black", "white", "grey", "gray", "pink", "purple",
    "orange", "brown", "beige", "navy", "gold", "silver", "khaki", "ivory", "cream", "tan",
    "teal", "turquoise", "burgundy", "maroon", "violet", "lavender", "coral", "olive", "mint",
    "camel", "charcoal", "multicolor", "multicolour", "transparent", "clear", "rose", "apricot",
    "wine", "sky", "dark", "light",
];

const SIZES: &[&str] = &[
    "xxs", "xs", "s", "m", "l", "xl", "xxl", "xxxl", "xxxxl", "2xl", "3xl", "4xl", "5xl", "6xl",
    "small", "medium", "large", "x-large", "xx-large", "extra small", "extra large", "one size",
    "free size", "petite", "plus", "regular", "king", "queen", "twin", "full",
];

const SIZE_UNITS: &[&str] = &["cm", "mm", "in", "inch", "eu", "us", "uk", "ml", "l", "oz"];

const MATERIALS: &[&str] = &[
    "cotton", "polyester", "leather", "wool", "silk", "linen", "nylon", "denim", "cashmere",
    "velvet", "suede", "spandex", "acrylic", "rayon", "viscose", "bamboo", "wood", "wooden",
    "metal", "steel", "stainless", "aluminum", "aluminium", "plastic", "glass", "ceramic",
    "rubber", "silicone", "canvas", "fleece", "satin",
];

impl AxisShape {
    pub const ALL: [AxisShape; 5] = [
        AxisShape::Color,
        AxisShape::Size,
        AxisShape::Material,
        AxisShape::Style,
        AxisShape::Model,
    ];

    /// Shape implied by an axis name (`"Main Colour 2"` is a color axis).
    pub fn of(name: &str) -> Option<Self> {
        let key = axis_key(name);
        let words: Vec<&str> = key
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .collect();
        Self::ALL
            .into_iter()
            .find(|shape| words.iter().any(|word| shape.names().contains(word)))
    }

    pub fn preference(&self) -> u32 {
        match self {
            AxisShape::Color => 100,
            AxisShape::Size => 90,
            AxisShape::Material => 60,
            AxisShape::Style => 55,
            AxisShape::Model => 50,
        }
    }

    fn names(&self) -> &'static [&'static str] {
        match self {
            AxisShape::Color => COLOR_NAMES,
            AxisShape::Size => SIZE_NAMES,
            AxisShape::Material => MATERIAL_NAMES,
            AxisShape::Style => STYLE_NAMES,
            AxisShape::Model => MODEL_NAMES,
        }
    }

    /// Whether a value lexically belongs to this shape's vocabulary.
    ///
    /// Colors and materials match on any word; sizes match on the whole value
    /// or a number with an optional unit. Style and model have no closed
    /// vocabulary.
    pub fn knows(&self, value: &str) -> bool {
        let value = value.trim().to_lowercase();
        if value.is_empty() {
            return false;
        }
        let words = || {
            value
                .split(|ch: char| !ch.is_alphanumeric())
                .filter(|word| !word.is_empty())
        };
        match self {
            AxisShape::Color => words().any(|word| COLORS.contains(&word)),
            AxisShape::Material => words().any(|word| MATERIALS.contains(&word)),
            AxisShape::Size => SIZES.contains(&value.as_str()) || is_measure(&value),
            AxisShape::Style | AxisShape::Model => false,
        }
    }
}

/// `"38"`, `"10.5"`, `"EU 40"`, `"30cm"`, `"32x34"`.
fn is_measure(value: &str) -> bool {
    let mut rest = value.trim();
    for unit in SIZE_UNITS {
        if let Some(stripped) = rest.strip_prefix(unit) {
            rest = stripped.trim_start();
            break;
        }
    }
    for unit in SIZE_UNITS {
        if let Some(stripped) = rest.strip_suffix(unit) {
            rest = stripped.trim_end();
            break;
        }
    }
    !rest.is_empty()
        && rest.chars().any(|ch| ch.is_ascii_digit())
        && rest
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | ',' | 'x' | '/' | '-' | ' '))
}

/// Rejects values that belong to a different axis's vocabulary.
#[derive(Debug, Clone)]
pub struct ContaminationFilter {
    shapes: Vec<Option<AxisShape>>,
}

impl ContaminationFilter {
    /// One entry per axis, in the order the axes will be filled.
    pub fn new(shapes: Vec<Option<AxisShape>>) -> Self {
        Self { shapes }
    }

    pub fn for_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(names.into_iter().map(AxisShape::of).collect())
    }

    /// Shape of another axis that claims `value`, when the value is not also
    /// part of the filled axis's own vocabulary.
    pub fn foreign_shape(&self, axis: usize, value: &str) -> Option<AxisShape> {
        let own = self.shapes.get(axis).copied().flatten();
        if own.map_or(false, |shape| shape.knows(value)) {
            return None;
        }
        self.shapes
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != axis)
            .filter_map(|(_, shape)| *shape)
            .filter(|shape| Some(*shape) != own)
            .find(|shape| shape.knows(value))
    }

    pub fn accepts(&self, axis: usize, value: &str) -> bool {
        self.foreign_shape(axis, value).is_none()
    }

    /// Splits `values` into kept and rejected for `axis`.
    pub fn partition(&self, axis: usize, values: &[String]) -> (Vec<String>, Vec<String>) {
        values
            .iter()
            .cloned()
            .partition(|value| self.accepts(axis, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_from_names() {
        assert_eq!(AxisShape::of("Main Colour 2"), Some(AxisShape::Color));
        assert_eq!(AxisShape::of("Shoe Size"), Some(AxisShape::Size));
        assert_eq!(AxisShape::of("Fabric"), Some(AxisShape::Material));
        assert_eq!(AxisShape::of("Compatible Model"), Some(AxisShape::Model));
        assert_eq!(AxisShape::of("Scent"), None);
    }

    #[test]
    fn vocabularies() {
        assert!(AxisShape::Color.knows("Navy Blue"));
        assert!(AxisShape::Size.knows("XL"));
        assert!(AxisShape::Size.knows("EU 40"));
        assert!(AxisShape::Size.knows("10.5"));
        assert!(!AxisShape::Size.knows("Red"));
        assert!(!AxisShape::Color.knows("XL"));
        assert!(AxisShape::Material.knows("100% Cotton"));
    }

    #[test]
    fn rejects_size_tokens_on_color_axis() {
        let filter = ContaminationFilter::for_names(["Color", "Size"]);
        let values: Vec<String> = ["Red", "XL", "Blue", "Sunset"].iter().map(|s| s.to_string()).collect();
        let (kept, rejected) = filter.partition(0, &values);
        assert_eq!(kept, vec!["Red", "Blue", "Sunset"]);
        assert_eq!(rejected, vec!["XL"]);
        assert_eq!(filter.foreign_shape(1, "Black"), Some(AxisShape::Color));
        assert!(filter.accepts(1, "M"));
    }

    #[test]
    fn shapeless_axes_accept_everything() {
        let filter = ContaminationFilter::for_names(["Scent"]);
        assert!(filter.accepts(0, "XL"));
        assert!(filter.accepts(0, "Red"));
    }
}
