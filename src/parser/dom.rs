use scraper::{ElementRef, Html, Node, Selector};

/// The slice of a parsed document the label-driven heuristics need: query by
/// visible text, walk up to an ancestor, collect descendant texts.
pub trait DocumentTree {
    type Node<'a>: Copy
    where
        Self: 'a;

    /// First `tag` element whose sole string contains `needle`.
    fn find_by_text(&self, tag: &str, needle: &str) -> Option<Self::Node<'_>>;

    /// Closest enclosing `tag` element, excluding `node` itself.
    fn nearest_ancestor<'a>(&'a self, node: Self::Node<'a>, tag: &str) -> Option<Self::Node<'a>>;

    /// Raw text of every descendant matching one of `tags`, in document order.
    fn descendant_texts<'a>(&'a self, node: Self::Node<'a>, tags: &[&str]) -> Vec<String>;
}

impl DocumentTree for Html {
    type Node<'a> = ElementRef<'a>;

    fn find_by_text(&self, tag: &str, needle: &str) -> Option<ElementRef<'_>> {
        let selector = Selector::parse(tag).ok()?;
        self.select(&selector)
            .find(|el| sole_string(*el).is_some_and(|s| s.contains(needle)))
    }

    fn nearest_ancestor<'a>(&'a self, node: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
        node.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == tag)
    }

    fn descendant_texts<'a>(&'a self, node: ElementRef<'a>, tags: &[&str]) -> Vec<String> {
        let Ok(selector) = Selector::parse(&tags.join(", ")) else {
            return Vec::new();
        };
        node.select(&selector).map(|el| el.text().collect()).collect()
    }
}

/// The element's only string: its single text child, or the sole string of its
/// single child element. Any element with more than one child has none.
pub fn sole_string(el: ElementRef<'_>) -> Option<String> {
    let mut children = el.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    match only.value() {
        Node::Text(text) => Some(String::from(&**text)),
        Node::Element(_) => ElementRef::wrap(only).and_then(sole_string),
        _ => None,
    }
}

/// Full text, trimmed at the ends. None when the element has no text at all.
pub fn clean_text(el: ElementRef<'_>) -> Option<String> {
    let raw: String = el.text().collect();
    if raw.is_empty() {
        None
    } else {
        Some(raw.trim().to_string())
    }
}

/// Every text piece stripped, then glued together without separators.
pub fn stripped_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|t| !t.is_empty()).collect()
}
