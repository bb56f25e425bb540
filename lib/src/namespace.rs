//! Prefix maps for compact IRIs (`rdf:type`, `ex:alice`).

use crate::consts::DEFAULT_PREFIXES;
use crate::error::TermError;
use crate::term::{NamedNode, Term};
use std::collections::BTreeMap;

/// A namespace IRI that builds terms by appending a local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(iri: impl Into<String>) -> Self {
        Namespace(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ns.term("name")` is the named node `<{ns}name>`.
    pub fn term(&self, local: &str) -> Result<Term, TermError> {
        Term::iri(format!("{}{}", self.0, local))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixMap {
    prefixes: BTreeMap<String, String>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map preloaded with the `rdf`, `rdfs`, `xsd` and `owl` prefixes.
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        for (prefix, ns) in DEFAULT_PREFIXES {
            map.insert(prefix, ns);
        }
        map
    }

    /// Binds `prefix` to `namespace`, replacing any earlier binding.
    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    pub fn get(&self, prefix: &str) -> Option<Namespace> {
        self.prefixes.get(prefix).map(|ns| Namespace::new(ns.as_str()))
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Expands `prefix:local`; `None` if the text has no colon or the prefix is unknown.
    pub fn expand(&self, curie: &str) -> Option<String> {
        let (prefix, local) = curie.split_once(':')?;
        self.prefixes
            .get(prefix)
            .map(|ns| format!("{ns}{local}"))
    }

    /// Expands `text` as a compact IRI, falling back to treating it as a full IRI.
    pub fn resolve(&self, text: &str) -> Result<NamedNode, TermError> {
        let text = text.trim();
        if let Some(iri) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            return NamedNode::new(iri);
        }
        match self.expand(text) {
            Some(iri) => NamedNode::new(iri),
            None => NamedNode::new(text),
        }
    }

    /// Shortens `iri` using the longest matching namespace.
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()) && iri.len() > ns.len())
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{}:{}", prefix, &iri[ns.len()..]))
    }

    /// Renders a term compactly when its IRI falls in a known namespace.
    pub fn display(&self, term: &Term) -> String {
        match term {
            Term::NamedNode(nn) => self
                .compact(nn.as_str())
                .unwrap_or_else(|| term.to_string()),
            _ => term.to_string(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::TYPE;

    #[test]
    fn expand_and_compact() {
        let mut map = PrefixMap::with_defaults();
        map.insert("ex", "http://example.org/");
        assert_eq!(map.expand("rdf:type").as_deref(), Some(TYPE));
        assert_eq!(map.expand("nope:x"), None);
        assert_eq!(
            map.compact("http://example.org/alice").as_deref(),
            Some("ex:alice")
        );
        assert_eq!(map.compact("http://example.org/"), None);
    }

    #[test]
    fn longest_namespace_wins() {
        let mut map = PrefixMap::new();
        map.insert("ex", "http://example.org/");
        map.insert("people", "http://example.org/people/");
        assert_eq!(
            map.compact("http://example.org/people/bob").as_deref(),
            Some("people:bob")
        );
    }

    #[test]
    fn resolve_accepts_full_and_compact_iris() {
        let map = PrefixMap::with_defaults();
        assert_eq!(map.resolve("rdf:type").unwrap().as_str(), TYPE);
        assert_eq!(
            map.resolve("<http://example.org/a>").unwrap().as_str(),
            "http://example.org/a"
        );
        assert!(map.resolve("not an iri").is_err());
    }

    #[test]
    fn namespace_builds_terms() {
        let ns = Namespace::new("http://example.org/");
        assert_eq!(
            ns.term("a").unwrap(),
            Term::iri("http://example.org/a").unwrap()
        );
    }
}
