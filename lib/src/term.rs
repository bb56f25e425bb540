//! RDF terms: IRIs, blank nodes, literals, collections, variables and the
//! default-graph marker.
//!
//! Terms are plain values. Two terms are equal iff their variants and all
//! fields are equal; there is no identity beyond that. Constructors that can
//! fail validate their input (IRI syntax, language tags, and the rule that a
//! literal never carries both a language tag and a datatype).

use crate::consts::{LANG_STRING, XSD_BOOLEAN, XSD_DOUBLE, XSD_INTEGER, XSD_STRING};
use crate::error::TermError;
use std::fmt;

/// An IRI node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamedNode(String);

impl NamedNode {
    /// Builds a named node, validating the IRI syntax.
    pub fn new(iri: impl Into<String>) -> Result<Self, TermError> {
        let iri = iri.into();
        match oxigraph::model::NamedNode::new(iri.as_str()) {
            Ok(nn) => Ok(NamedNode(nn.into_string())),
            Err(e) => Err(TermError::InvalidIri {
                iri,
                message: e.to_string(),
            }),
        }
    }

    /// Builds a named node without validation. The caller guarantees a valid IRI.
    pub fn new_unchecked(iri: impl Into<String>) -> Self {
        NamedNode(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// A blank node. Its identifier is only meaningful inside one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlankNode(String);

impl BlankNode {
    /// Builds a blank node from a label, with or without the `_:` prefix.
    pub fn new(id: impl Into<String>) -> Result<Self, TermError> {
        let id = id.into();
        let id = id.strip_prefix("_:").map(str::to_string).unwrap_or(id);
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !valid || id.ends_with('.') {
            return Err(TermError::InvalidBlankNode(id));
        }
        Ok(BlankNode(id))
    }

    pub fn new_unchecked(id: impl Into<String>) -> Self {
        BlankNode(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.0)
    }
}

/// A literal: lexical form plus at most one of language tag or datatype.
///
/// Simple literals (and `xsd:string` literals, which are normalized to them)
/// carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    value: String,
    language: Option<String>,
    datatype: Option<NamedNode>,
}

impl Literal {
    /// Builds a literal from optional language and datatype, rejecting both at once.
    pub fn new(
        value: impl Into<String>,
        language: Option<&str>,
        datatype: Option<NamedNode>,
    ) -> Result<Self, TermError> {
        let value = value.into();
        match (language, datatype) {
            (Some(lang), Some(dt)) if dt.as_str() == LANG_STRING => {
                Self::new_language_tagged(value, lang)
            }
            (Some(_), Some(_)) => Err(TermError::LanguageAndDatatype { lexical: value }),
            (Some(lang), None) => Self::new_language_tagged(value, lang),
            (None, Some(dt)) => Self::new_typed(value, dt),
            (None, None) => Ok(Self::new_simple(value)),
        }
    }

    pub fn new_simple(value: impl Into<String>) -> Self {
        Literal {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    /// Builds a language-tagged literal. Tags are validated and lowercased.
    pub fn new_language_tagged(
        value: impl Into<String>,
        language: &str,
    ) -> Result<Self, TermError> {
        if !is_valid_language_tag(language) {
            return Err(TermError::InvalidLanguageTag(language.to_string()));
        }
        Ok(Literal {
            value: value.into(),
            language: Some(language.to_ascii_lowercase()),
            datatype: None,
        })
    }

    /// Builds a typed literal. `xsd:string` collapses to a simple literal.
    pub fn new_typed(value: impl Into<String>, datatype: NamedNode) -> Result<Self, TermError> {
        let value = value.into();
        if datatype.as_str() == LANG_STRING {
            return Err(TermError::MissingLanguageTag(value));
        }
        if datatype.as_str() == XSD_STRING {
            return Ok(Self::new_simple(value));
        }
        Ok(Literal {
            value,
            language: None,
            datatype: Some(datatype),
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// The datatype given at construction, if any.
    pub fn explicit_datatype(&self) -> Option<&NamedNode> {
        self.datatype.as_ref()
    }

    /// The effective datatype IRI: `rdf:langString` for tagged literals,
    /// `xsd:string` for simple ones.
    pub fn datatype(&self) -> &str {
        match (&self.language, &self.datatype) {
            (Some(_), _) => LANG_STRING,
            (None, Some(dt)) => dt.as_str(),
            (None, None) => XSD_STRING,
        }
    }
}

fn is_valid_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let Some(primary) = parts.next() else {
        return false;
    };
    if primary.is_empty() || primary.len() > 8 || !primary.chars().all(|c| c.is_ascii_alphabetic())
    {
        return false;
    }
    parts.all(|p| !p.is_empty() && p.len() <= 8 && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Escapes a lexical form for N-Triples / SPARQL string syntax.
pub(crate) fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape_string(&self.value))?;
        if let Some(lang) = &self.language {
            write!(f, "@{lang}")
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^{dt}")
        } else {
            Ok(())
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::new_simple(value)
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::new_simple(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal {
            value: value.to_string(),
            language: None,
            datatype: Some(NamedNode::new_unchecked(XSD_INTEGER)),
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal {
            value: value.to_string(),
            language: None,
            datatype: Some(NamedNode::new_unchecked(XSD_BOOLEAN)),
        }
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        let lexical = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            let lexical = if value > 0.0 { "INF" } else { "-INF" };
            lexical.to_string()
        } else {
            format!("{value:?}")
        };
        Literal {
            value: lexical,
            language: None,
            datatype: Some(NamedNode::new_unchecked(XSD_DOUBLE)),
        }
    }
}

/// A query variable, named without the leading `?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Result<Self, TermError> {
        let name = name.into();
        let name = name
            .strip_prefix('?')
            .or_else(|| name.strip_prefix('$'))
            .map(str::to_string)
            .unwrap_or(name);
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(TermError::InvalidVariable(name));
        }
        Ok(Variable(name))
    }

    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Variable(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Any RDF term, plus variables for patterns and the default-graph marker
/// for the fourth quad position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    Literal(Literal),
    /// An ordered list of terms, stored as a single value.
    Collection(Vec<Term>),
    Variable(Variable),
    /// The graph of quads added without an explicit graph.
    DefaultGraph,
}

impl Term {
    /// Shorthand for a validated named node term.
    pub fn iri(iri: impl Into<String>) -> Result<Self, TermError> {
        Ok(Term::NamedNode(NamedNode::new(iri)?))
    }

    pub fn blank(id: impl Into<String>) -> Result<Self, TermError> {
        Ok(Term::BlankNode(BlankNode::new(id)?))
    }

    pub fn variable(name: impl Into<String>) -> Result<Self, TermError> {
        Ok(Term::Variable(Variable::new(name)?))
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(Literal::new_simple(value))
    }

    pub fn is_named_node(&self) -> bool {
        matches!(self, Term::NamedNode(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, Term::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_default_graph(&self) -> bool {
        matches!(self, Term::DefaultGraph)
    }

    pub fn as_named_node(&self) -> Option<&NamedNode> {
        match self {
            Term::NamedNode(nn) => Some(nn),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Term::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// True if the term, or any member of a collection, is a blank node.
    pub fn contains_blank_node(&self) -> bool {
        match self {
            Term::BlankNode(_) => true,
            Term::Collection(items) => items.iter().any(Term::contains_blank_node),
            _ => false,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode(nn) => nn.fmt(f),
            Term::BlankNode(bn) => bn.fmt(f),
            Term::Literal(l) => l.fmt(f),
            Term::Variable(v) => v.fmt(f),
            Term::DefaultGraph => write!(f, "DEFAULT"),
            Term::Collection(items) => {
                write!(f, "(")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                write!(f, " )")
            }
        }
    }
}

impl From<NamedNode> for Term {
    fn from(nn: NamedNode) -> Self {
        Term::NamedNode(nn)
    }
}

impl From<BlankNode> for Term {
    fn from(bn: BlankNode) -> Self {
        Term::BlankNode(bn)
    }
}

impl From<Literal> for Term {
    fn from(l: Literal) -> Self {
        Term::Literal(l)
    }
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Self {
        Term::Variable(v)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::Collection(items)
    }
}
