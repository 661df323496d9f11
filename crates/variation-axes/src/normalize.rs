//! Axis name normalization.

const SEPARATORS: &[char] = &['-', '_', '#', '/', '.', ',', ';', '|', '*', '~'];
const COUNT_WORDS: &[&str] = &["options", "option", "values", "value", "choices", "variants", "types", "colors", "sizes"];

/// Canonical spelling of a source axis name.
///
/// Removes colon qualifiers (`"Color: Main"`), bracketed trailers (`"Size (3)"`),
/// trailing counts (`"Size 3 options"`) and positional suffixes (`"Color 2"`,
/// `"Size_1"`, `"Color #2"`). Stripping repeats until nothing changes, so the
/// function is idempotent. A name that would strip to nothing is only
/// whitespace-collapsed.
pub fn normalize_axis_name(raw: &str) -> String {
    let base = collapse(raw);
    let mut current = base.clone();
    loop {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    if current.is_empty() {
        base
    } else {
        current
    }
}

/// Lowercased normalized name, used for dedupe and matching.
pub fn axis_key(raw: &str) -> String {
    normalize_axis_name(raw).to_lowercase()
}

/// Lowercased letters and digits only.
pub fn squash(text: &str) -> String {
    text.chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_once(text: &str) -> String {
    let mut out = text.to_string();

    if let Some((head, tail)) = out.split_once(':') {
        out = if head.trim().is_empty() { tail } else { head }.to_string();
    }

    let trimmed = out.trim_end();
    if let Some(open) = match trimmed.chars().last() {
        Some(')') => trimmed.rfind('('),
        Some(']') => trimmed.rfind('['),
        _ => None,
    } {
        out = trimmed[..open].to_string();
    }

    let words: Vec<&str> = out.split_whitespace().collect();
    if words.len() >= 2 {
        let last = words[words.len() - 1].to_lowercase();
        let before = words[words.len() - 2];
        if COUNT_WORDS.contains(&last.as_str()) && before.chars().all(|ch| ch.is_ascii_digit()) {
            out = words[..words.len() - 2].join(" ");
        }
    }

    let without_digits = out.trim_end().trim_end_matches(|ch: char| ch.is_ascii_digit());
    if without_digits.len() < out.trim_end().len()
        && without_digits.chars().any(char::is_alphabetic)
    {
        out = without_digits.to_string();
    }

    collapse(out.trim_matches(|ch: char| ch.is_whitespace() || SEPARATORS.contains(&ch)))
}

/// True when `name` is nothing but two or more of `values` glued together
/// (`"RedBlue"` over `Red`, `Blue`; `"S/M/L"` over `S`, `M`, `L`).
pub fn is_value_concatenation(name: &str, values: &[String]) -> bool {
    let target = squash(name);
    let pieces: Vec<String> = values
        .iter()
        .map(|value| squash(value))
        .filter(|piece| !piece.is_empty())
        .collect();
    if target.is_empty() || pieces.len() < 2 {
        return false;
    }
    // fewest[i]: fewest pieces covering target[..i]
    let mut fewest = vec![usize::MAX; target.len() + 1];
    fewest[0] = 0;
    for start in 0..target.len() {
        if fewest[start] == usize::MAX {
            continue;
        }
        let Some(rest) = target.get(start..) else { continue };
        for piece in &pieces {
            if rest.starts_with(piece.as_str()) {
                let end = start + piece.len();
                fewest[end] = fewest[end].min(fewest[start] + 1);
            }
        }
    }
    let used = fewest[target.len()];
    used != usize::MAX && used >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_qualifiers_and_suffixes() {
        assert_eq!(normalize_axis_name("Color: Main"), "Color");
        assert_eq!(normalize_axis_name("  Size (3 options) "), "Size");
        assert_eq!(normalize_axis_name("Color 2"), "Color");
        assert_eq!(normalize_axis_name("Size_1"), "Size");
        assert_eq!(normalize_axis_name("Color #2"), "Color");
        assert_eq!(normalize_axis_name("Size 4 values"), "Size");
        assert_eq!(normalize_axis_name("Shoe   Size"), "Shoe Size");
        assert_eq!(normalize_axis_name("Colour [EU] (2)"), "Colour");
    }

    #[test]
    fn unstrippable_names_are_only_collapsed() {
        assert_eq!(normalize_axis_name("  123 "), "123");
        assert_eq!(normalize_axis_name("(1) 2"), "(1) 2");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Color: Main",
            "Size (3 options)",
            "Color 2",
            "  123 ",
            "(1) 2",
            "Style - 2",
            "Material:",
            ": Fabric",
            "A1 B2",
            "Pattern [x] [y]",
            "Size 3 options 2",
            "色 2",
            "",
        ];
        for sample in samples {
            let once = normalize_axis_name(sample);
            assert_eq!(normalize_axis_name(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn detects_value_concatenations() {
        let values = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(is_value_concatenation("RedBlue", &values(&["Red", "Blue"])));
        assert!(is_value_concatenation("S/M/L", &values(&["S", "M", "L"])));
        assert!(!is_value_concatenation("Color", &values(&["Red", "Blue"])));
        assert!(!is_value_concatenation("Red", &values(&["Red", "Blue"])));
        assert!(!is_value_concatenation("Size", &values(&["S"])));
    }
}
