/// Maximum number of classes kept per path segment
pub const MAX_CLASSES: usize = 3;

/// Read-only view of an element, enough to derive a CSS path for it.
///
/// Implemented by the in-memory document and by the ancestor chains
/// captured from a live page.
pub trait SelectorNode: Sized {
    /// Tag name in any case; selectors always use lower case
    fn tag_name(&self) -> &str;

    /// `id` attribute, empty when absent
    fn element_id(&self) -> &str;

    /// Raw `class` attribute
    fn class_name(&self) -> &str;

    fn parent(&self) -> Option<Self>;

    fn is_body(&self) -> bool;

    /// 1-based index among the parent's children sharing this tag, and how
    /// many such children there are
    fn same_tag_position(&self) -> (usize, usize);
}

/// Build a CSS selector addressing `element`.
///
/// Elements with an id resolve to `#id`. Otherwise the path is assembled
/// bottom-up until `<body>` (exclusive) or an ancestor with an id, which
/// anchors the path and ends the walk. Each segment is the lower-cased tag,
/// up to [`MAX_CLASSES`] classes, and `:nth-child(k)` when siblings share
/// the tag. Segments are joined with `" > "`.
///
/// `<body>` itself resolves to the empty string.
pub fn generate_selector<N: SelectorNode + Clone>(element: &N) -> String {
    let id = element.element_id();
    if !id.is_empty() {
        return format!("#{}", id);
    }

    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(element.clone());

    while let Some(node) = current {
        if node.is_body() {
            break;
        }

        let mut segment = node.tag_name().to_lowercase();

        let id = node.element_id();
        if !id.is_empty() {
            segment.push('#');
            segment.push_str(id);
            segments.push(segment);
            break;
        }

        let classes: Vec<&str> = node
            .class_name()
            .split_whitespace()
            .take(MAX_CLASSES)
            .collect();
        if !classes.is_empty() {
            segment.push('.');
            segment.push_str(&classes.join("."));
        }

        let (index, count) = node.same_tag_position();
        if count > 1 {
            segment.push_str(&format!(":nth-child({})", index));
        }

        segments.push(segment);
        current = node.parent();
    }

    segments.reverse();
    segments.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn selector_for(markup: &str, id_path: &[usize]) -> String {
        let doc = Document::parse(markup, "https://example.com/").unwrap();
        let mut node = doc.body();
        for index in id_path {
            node = doc.element_children(node)[*index];
        }
        generate_selector(&doc.element(node))
    }

    #[test]
    fn test_id_short_circuits() {
        let selector = selector_for(
            r#"<div class="wrap"><button id="submit" class="btn">Go</button></div>"#,
            &[0, 0],
        );
        assert_eq!(selector, "#submit");
    }

    #[test]
    fn test_path_to_body() {
        let selector = selector_for(
            r#"<main><ul class="items  list"><li>a</li><li class="x y z w">b</li></ul></main>"#,
            &[0, 0, 1],
        );
        assert_eq!(selector, "main > ul.items.list > li.x.y.z:nth-child(2)");
    }

    #[test]
    fn test_ancestor_id_anchors_path() {
        let selector = selector_for(
            r#"<div><section id="form-area"><span>a</span><span>b</span></section></div>"#,
            &[0, 0, 0],
        );
        assert_eq!(selector, "section#form-area > span:nth-child(1)");
    }

    #[test]
    fn test_body_resolves_to_empty() {
        let doc = Document::parse("<p>x</p>", "").unwrap();
        assert_eq!(generate_selector(&doc.element(doc.body())), "");
    }

    #[test]
    fn test_single_same_tag_sibling_has_no_position() {
        let selector = selector_for(r#"<div><p>a</p><span>b</span></div>"#, &[0, 1]);
        assert_eq!(selector, "div > span");
    }
}
