//! Query engine for the selector subset the resolver emits:
//! tag, `#id`, `.class`, `:nth-child(n)`, child (`>`) and descendant
//! combinators.
//!
//! `:nth-child(n)` follows CSS: the element must be the n-th *element*
//! child of its parent, whatever the siblings' tags.

use regex::Regex;
use std::sync::LazyLock;

use crate::dom::{Document, NodeId};
use crate::error::SelectorError;

static COMPOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<tag>\*|[A-Za-z][A-Za-z0-9-]*)?(?P<rest>(?:[#.][^#.:\s>]+)*)(?::nth-child\(\s*(?P<nth>\d+)\s*\))?$",
    )
    .unwrap()
});

static SIMPLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([#.])([^#.:\s>]+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Child,
    Descendant,
}

/// One compound selector such as `li.item:nth-child(2)`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound {
    /// Lower-cased tag, `None` for `*` or when omitted
    pub tag: Option<String>,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub nth_child: Option<usize>,
}

/// Parsed selector; `combinators[i]` joins `parts[i]` and `parts[i + 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSelector {
    parts: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl ParsedSelector {
    pub fn parse(selector: &str) -> Result<Self, SelectorError> {
        let spaced = selector.replace('>', " > ");
        let mut parts = Vec::new();
        let mut combinators = Vec::new();
        let mut pending: Option<Combinator> = None;

        for token in spaced.split_whitespace() {
            if token == ">" {
                if parts.is_empty() || pending.is_some() {
                    return Err(SelectorError::new(selector, "misplaced `>`"));
                }
                pending = Some(Combinator::Child);
                continue;
            }

            let compound = parse_compound(selector, token)?;
            if !parts.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }
            parts.push(compound);
        }

        if parts.is_empty() {
            return Err(SelectorError::new(selector, "empty selector"));
        }
        if pending.is_some() {
            return Err(SelectorError::new(selector, "dangling `>`"));
        }

        Ok(Self { parts, combinators })
    }

    pub fn parts(&self) -> &[Compound] {
        &self.parts
    }

    /// Whether `node` is matched by the whole selector
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.matches_from(doc, node, self.parts.len() - 1)
    }

    fn matches_from(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        if !compound_matches(&self.parts[index], doc, node) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => doc
                .parent_element(node)
                .map_or(false, |parent| self.matches_from(doc, parent, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = doc.parent_element(node);
                while let Some(candidate) = ancestor {
                    if self.matches_from(doc, candidate, index - 1) {
                        return true;
                    }
                    ancestor = doc.parent_element(candidate);
                }
                false
            }
        }
    }

    /// First element in document order matched by the selector
    pub fn first_match(&self, doc: &Document) -> Option<NodeId> {
        doc.elements()
            .into_iter()
            .find(|node| self.matches(doc, *node))
    }
}

fn parse_compound(selector: &str, token: &str) -> Result<Compound, SelectorError> {
    let caps = COMPOUND
        .captures(token)
        .ok_or_else(|| SelectorError::new(selector, format!("cannot parse `{}`", token)))?;

    let mut compound = Compound {
        tag: caps
            .name("tag")
            .map(|m| m.as_str())
            .filter(|tag| *tag != "*")
            .map(|tag| tag.to_lowercase()),
        ..Default::default()
    };

    if let Some(rest) = caps.name("rest") {
        for simple in SIMPLE.captures_iter(rest.as_str()) {
            let name = simple[2].to_string();
            if &simple[1] == "#" {
                compound.ids.push(name);
            } else {
                compound.classes.push(name);
            }
        }
    }

    if let Some(nth) = caps.name("nth") {
        let n: usize = nth
            .as_str()
            .parse()
            .map_err(|_| SelectorError::new(selector, "bad :nth-child index"))?;
        compound.nth_child = Some(n);
    }

    if compound.tag.is_none()
        && compound.ids.is_empty()
        && compound.classes.is_empty()
        && compound.nth_child.is_none()
        && !token.starts_with('*')
    {
        return Err(SelectorError::new(selector, format!("cannot parse `{}`", token)));
    }

    Ok(compound)
}

fn compound_matches(compound: &Compound, doc: &Document, node: NodeId) -> bool {
    if let Some(tag) = &compound.tag {
        if doc.tag_name(node) != tag.as_str() {
            return false;
        }
    }

    if !compound.ids.iter().all(|id| doc.element_id(node) == id.as_str()) {
        return false;
    }

    if !compound.classes.is_empty() {
        let classes: Vec<&str> = doc.class_name(node).split_whitespace().collect();
        if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
    }

    if let Some(n) = compound.nth_child {
        if doc.element_index(node) != n {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::generate_selector;

    const PAGE: &str = r#"
        <div id="app">
            <form class="login wide">
                <label>User</label>
                <input type="text" name="user" />
                <input type="password" name="pass" />
                <button id="submit" class="btn primary">Sign in</button>
            </form>
            <ul><li>one</li><li class="current">two</li></ul>
        </div>
    "#;

    fn doc() -> Document {
        Document::parse(PAGE, "https://example.com/login").unwrap()
    }

    #[test]
    fn test_parse_compound_parts() {
        let parsed = ParsedSelector::parse("div#app > form.login.wide input:nth-child(3)").unwrap();
        let parts = parsed.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].ids, vec!["app".to_string()]);
        assert_eq!(parts[1].classes.len(), 2);
        assert_eq!(parts[2].nth_child, Some(3));
        assert_eq!(parsed.combinators, vec![Combinator::Child, Combinator::Descendant]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ParsedSelector::parse("").is_err());
        assert!(ParsedSelector::parse("> div").is_err());
        assert!(ParsedSelector::parse("div >").is_err());
        assert!(ParsedSelector::parse("div > > p").is_err());
        assert!(ParsedSelector::parse("a[href]").is_err());
    }

    #[test]
    fn test_id_lookup() {
        let doc = doc();
        let node = doc.query_selector("#submit").unwrap().unwrap();
        assert_eq!(doc.tag_name(node), "button");
    }

    #[test]
    fn test_nth_child_counts_all_element_siblings() {
        let doc = doc();
        // label is child 1, so the password field is child 3
        let node = doc
            .query_selector("form.login > input:nth-child(3)")
            .unwrap()
            .unwrap();
        assert_eq!(doc.attribute(node, "name"), Some("pass"));
        assert!(doc.query_selector("form > input:nth-child(1)").unwrap().is_none());
    }

    #[test]
    fn test_descendant_combinator() {
        let doc = doc();
        let node = doc.query_selector("#app li.current").unwrap().unwrap();
        assert_eq!(doc.text_content(node), "two");
        assert!(doc.query_selector("form li").unwrap().is_none());
    }

    fn descendants(doc: &Document, node: NodeId, out: &mut Vec<NodeId>) {
        for child in doc.element_children(node) {
            out.push(child);
            descendants(doc, child, out);
        }
    }

    #[test]
    fn test_generated_selectors_resolve_back() {
        let doc = Document::parse(
            r#"
            <main>
                <header class="top"><h1>Title</h1></header>
                <section id="login">
                    <input type="text" />
                    <input type="password" />
                </section>
                <ul class="menu"><li>a</li><li class="active">b</li><li>c</li></ul>
                <footer><p class="note">x</p><p>y</p></footer>
            </main>
            "#,
            "https://example.com/",
        )
        .unwrap();

        let mut nodes = Vec::new();
        descendants(&doc, doc.body(), &mut nodes);
        assert_eq!(nodes.len(), 13);
        for node in nodes {
            let selector = generate_selector(&doc.element(node));
            assert_eq!(
                doc.query_selector(&selector).unwrap(),
                Some(node),
                "selector `{}` did not resolve back",
                selector
            );
        }
    }

    #[test]
    fn test_mixed_tag_siblings_keep_css_positions() {
        let doc = Document::parse(
            r#"<main><form><label>Name</label><input name="first" /><input name="second" /></form></main>"#,
            "",
        )
        .unwrap();
        let form = doc.query_selector("main > form").unwrap().unwrap();
        let inputs = doc.element_children(form)[1..].to_vec();

        let first = generate_selector(&doc.element(inputs[0]));
        let second = generate_selector(&doc.element(inputs[1]));
        assert_eq!(first, "main > form > input:nth-child(1)");
        assert_eq!(second, "main > form > input:nth-child(2)");

        // The generator counts same-tag siblings, the query counts all of them.
        assert_eq!(doc.query_selector(&first).unwrap(), None);
        assert_eq!(doc.query_selector(&second).unwrap(), Some(inputs[0]));
    }

    #[test]
    fn test_uppercase_tag_matches() {
        let doc = doc();
        assert!(doc.query_selector("BUTTON.btn").unwrap().is_some());
    }
}
