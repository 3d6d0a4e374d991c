use super::dom::DocumentTree;

const LABEL_TAG: &str = "div";
const SECTION_TAG: &str = "section";
const PILL_TAGS: &[&str] = &["a", "span"];

/// Tag values for the labelled taxonomy block (e.g. "Age", "Subject").
///
/// Locates the first `div` whose text contains `label`, climbs to its nearest
/// `section`, and returns the trimmed, non-empty text of every link and span
/// inside it. No class names are assumed. Sections that hold more than one
/// label, or unrelated pills, are collected as-is.
pub fn extract_taxonomy<D: DocumentTree>(doc: &D, label: &str) -> Vec<String> {
    let Some(label_node) = doc.find_by_text(LABEL_TAG, label) else {
        return Vec::new();
    };
    let Some(section) = doc.nearest_ancestor(label_node, SECTION_TAG) else {
        return Vec::new();
    };

    doc.descendant_texts(section, PILL_TAGS)
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
