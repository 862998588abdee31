use scraper::{ElementRef, Html};

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// Text nodes that are direct children of `node`, descendants excluded.
pub fn own_text_nodes(node: ElementRef) -> Vec<String> {
    node.children()
        .filter_map(|child| child.value().as_text())
        .map(|text| text.to_string())
        .collect()
}

/// Own text with runs of whitespace collapsed to single spaces.
pub fn own_text(node: ElementRef) -> String {
    normalize_whitespace(&own_text_nodes(node).join(" "))
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First element whose own text contains `needle`, ignoring case and
/// whitespace layout.
pub fn find_own_text<'a>(document: &'a Html, needle: &str) -> Option<ElementRef<'a>> {
    let needle = normalize_whitespace(needle).to_lowercase();
    if needle.is_empty() {
        return None;
    }
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| own_text(*element).to_lowercase().contains(&needle))
}

pub fn contains_own_text(document: &Html, needle: &str) -> bool {
    find_own_text(document, needle).is_some()
}

pub fn child_elements<'a>(node: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    node.children().filter_map(ElementRef::wrap)
}
