//! Custom element name validation

/// Names reserved by SVG and MathML
const RESERVED: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

/// Validate a custom element name
///
/// Accepts `[a-z][.0-9_a-z]*-[-.0-9_a-z]*` minus the reserved names.
pub fn is_valid_custom_element_name(name: &str) -> bool {
    if RESERVED.contains(&name) {
        return false;
    }

    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }

    let mut seen_hyphen = false;
    for c in chars {
        match c {
            '-' => seen_hyphen = true,
            'a'..='z' | '0'..='9' | '.' | '_' => {}
            _ => return false,
        }
    }
    seen_hyphen
}
