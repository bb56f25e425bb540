//! Basic graph pattern queries.
//!
//! A [`PatternQuery`] is an ordered list of [`QuadPattern`]s plus an optional
//! projection. Executing it against a [`Store`] yields one [`Binding`] per
//! consistent combination of matching quads (a nested-loop join). Queries hold
//! no reference to a store and can be executed any number of times.

mod parser;

pub use parser::{parse_term, parse_term_with};

use crate::error::MalformedQueryError;
use crate::options::PatternOrder;
use crate::store::Store;
use crate::term::{Term, Variable};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One triple pattern, optionally scoped to a graph.
///
/// A `graph` of `None` matches quads in every graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: Option<Term>,
}

impl QuadPattern {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        QuadPattern {
            subject,
            predicate,
            object,
            graph: None,
        }
    }

    pub fn in_graph(mut self, graph: Term) -> Self {
        self.graph = Some(graph);
        self
    }

    fn terms(&self) -> impl Iterator<Item = &Term> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .chain(self.graph.as_ref())
    }

    fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.terms().filter_map(Term::as_variable)
    }

    /// Checks which terms may occupy each position. `index` is reported as the
    /// error position.
    fn check(&self, index: usize) -> Result<(), MalformedQueryError> {
        let fail = |message: &str, term: &Term| {
            Err(MalformedQueryError::new(message, term.to_string(), index))
        };
        match &self.subject {
            Term::NamedNode(_) | Term::BlankNode(_) | Term::Variable(_) => {}
            other => return fail("subject must be an IRI, blank node or variable", other),
        }
        match &self.predicate {
            Term::NamedNode(_) | Term::Variable(_) => {}
            other => return fail("predicate must be an IRI or variable", other),
        }
        match &self.object {
            Term::DefaultGraph => {
                return fail("the default graph can only appear in the graph position", &self.object)
            }
            Term::Collection(items) if items.iter().any(collection_has_variable) => {
                return fail("variables inside collections are not supported", &self.object)
            }
            _ => {}
        }
        match &self.graph {
            None
            | Some(Term::NamedNode(_))
            | Some(Term::BlankNode(_))
            | Some(Term::Variable(_))
            | Some(Term::DefaultGraph) => Ok(()),
            Some(other) => fail("graph must be an IRI, blank node or variable", other),
        }
    }
}

fn collection_has_variable(term: &Term) -> bool {
    match term {
        Term::Variable(_) => true,
        Term::Collection(items) => items.iter().any(collection_has_variable),
        _ => false,
    }
}

/// A set of variable assignments, iterated in variable-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binding(BTreeMap<String, Term>);

impl Binding {
    pub fn get(&self, variable: &str) -> Option<&Term> {
        let name = variable
            .strip_prefix('?')
            .or_else(|| variable.strip_prefix('$'))
            .unwrap_or(variable);
        self.0.get(name)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.get(variable).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn resolve<'a>(&'a self, term: &'a Term) -> Option<&'a Term> {
        match term {
            Term::Variable(v) => self.0.get(v.as_str()),
            other => Some(other),
        }
    }

    /// Extends the binding with the variables of `pattern` taken from the
    /// matching quad terms, or `None` if a variable would get two values.
    fn extend(&self, pattern: &QuadPattern, quad: [&Term; 4]) -> Option<Binding> {
        let mut next = self.clone();
        let pairs = [
            (Some(&pattern.subject), quad[0]),
            (Some(&pattern.predicate), quad[1]),
            (Some(&pattern.object), quad[2]),
            (pattern.graph.as_ref(), quad[3]),
        ];
        for (pattern_term, value) in pairs {
            let Some(Term::Variable(v)) = pattern_term else {
                continue;
            };
            match next.0.get(v.as_str()) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    next.0.insert(v.as_str().to_string(), value.clone());
                }
            }
        }
        Some(next)
    }

    fn project(mut self, variables: &[Variable]) -> Binding {
        self.0
            .retain(|name, _| variables.iter().any(|v| v.as_str() == name));
        self
    }
}

impl<'a> IntoIterator for &'a Binding {
    type Item = (&'a String, &'a Term);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Term)> for Binding {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Binding(iter.into_iter().collect())
    }
}

/// A term in the SPARQL 1.1 JSON results encoding.
pub fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(nn) => json!({ "type": "uri", "value": nn.as_str() }),
        Term::BlankNode(bn) => json!({ "type": "bnode", "value": bn.as_str() }),
        Term::Literal(lit) => {
            let mut value = json!({ "type": "literal", "value": lit.value() });
            if let Some(lang) = lit.language() {
                value["xml:lang"] = json!(lang);
            } else if let Some(dt) = lit.explicit_datatype() {
                value["datatype"] = json!(dt.as_str());
            }
            value
        }
        // collections have no standard encoding; emit their members in order
        Term::Collection(items) => json!({
            "type": "collection",
            "value": items.iter().map(term_to_json).collect::<Vec<_>>(),
        }),
        Term::Variable(v) => json!({ "type": "variable", "value": v.as_str() }),
        Term::DefaultGraph => json!({ "type": "default-graph", "value": "" }),
    }
}

impl Serialize for Binding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, term) in &self.0 {
            map.serialize_entry(name, &term_to_json(term))?;
        }
        map.end()
    }
}

/// An immutable basic graph pattern query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternQuery {
    patterns: Vec<QuadPattern>,
    variables: Vec<Variable>,
    projection: Option<Vec<Variable>>,
    order: PatternOrder,
}

impl PatternQuery {
    /// Builds a query returning every variable.
    pub fn new(patterns: Vec<QuadPattern>) -> Result<Self, MalformedQueryError> {
        Self::build(patterns, None)
    }

    /// Builds a query whose bindings are restricted to `projection`.
    pub fn with_projection(
        patterns: Vec<QuadPattern>,
        projection: Vec<Variable>,
    ) -> Result<Self, MalformedQueryError> {
        Self::build(patterns, Some(projection))
    }

    /// Parses the textual pattern syntax, e.g.
    /// `PREFIX ex: <http://example.org/> SELECT ?x WHERE { ?x ex:knows ?y }`.
    pub fn parse(text: &str) -> Result<Self, MalformedQueryError> {
        parser::parse_query(text)
    }

    fn build(
        patterns: Vec<QuadPattern>,
        projection: Option<Vec<Variable>>,
    ) -> Result<Self, MalformedQueryError> {
        for (i, pattern) in patterns.iter().enumerate() {
            pattern.check(i)?;
        }
        let mut variables: Vec<Variable> = Vec::new();
        for v in patterns.iter().flat_map(QuadPattern::variables) {
            if !variables.contains(v) {
                variables.push(v.clone());
            }
        }
        if let Some(projection) = &projection {
            if let Some((i, missing)) = projection
                .iter()
                .enumerate()
                .find(|(_, v)| !variables.contains(v))
            {
                return Err(MalformedQueryError::new(
                    "projected variable does not appear in any pattern",
                    missing.to_string(),
                    i,
                ));
            }
        }
        Ok(PatternQuery {
            patterns,
            variables,
            projection,
            order: PatternOrder::default(),
        })
    }

    /// Returns the same query, executed with the given pattern order.
    pub fn with_order(mut self, order: PatternOrder) -> Self {
        self.order = order;
        self
    }

    pub fn patterns(&self) -> &[QuadPattern] {
        &self.patterns
    }

    /// Distinct variables in order of first occurrence.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn projection(&self) -> Option<&[Variable]> {
        self.projection.as_deref()
    }

    /// The variables each result binding can contain.
    pub fn result_variables(&self) -> &[Variable] {
        self.projection.as_deref().unwrap_or(&self.variables)
    }

    /// The patterns in the order execution visits them.
    pub fn execution_order(&self) -> Vec<&QuadPattern> {
        match self.order {
            PatternOrder::Source => self.patterns.iter().collect(),
            PatternOrder::Selectivity => {
                let mut remaining: Vec<&QuadPattern> = self.patterns.iter().collect();
                let mut bound: BTreeSet<&Variable> = BTreeSet::new();
                let mut ordered = Vec::with_capacity(remaining.len());
                while !remaining.is_empty() {
                    let score = |p: &QuadPattern| {
                        p.terms()
                            .filter(|t| t.as_variable().map_or(true, |v| bound.contains(v)))
                            .count()
                    };
                    // first pattern with the highest score, so ties keep source order
                    let mut best = 0;
                    for (i, p) in remaining.iter().enumerate().skip(1) {
                        if score(*p) > score(remaining[best]) {
                            best = i;
                        }
                    }
                    let next = remaining.remove(best);
                    bound.extend(next.variables());
                    ordered.push(next);
                }
                ordered
            }
        }
    }

    /// Enumerates every binding of the query's variables against `store`.
    ///
    /// With no patterns the result is a single empty binding.
    pub fn execute(&self, store: &Store) -> Vec<Binding> {
        let mut rows = vec![Binding::default()];
        for pattern in self.execution_order() {
            let mut next = Vec::new();
            for row in &rows {
                let subject = row.resolve(&pattern.subject);
                let predicate = row.resolve(&pattern.predicate);
                let object = row.resolve(&pattern.object);
                let graph = pattern.graph.as_ref().and_then(|g| row.resolve(g));
                for quad in store.match_quads(subject, predicate, object, graph) {
                    let terms = [quad.subject(), quad.predicate(), quad.object(), quad.graph()];
                    if let Some(extended) = row.extend(pattern, terms) {
                        next.push(extended);
                    }
                }
            }
            rows = next;
            if rows.is_empty() {
                break;
            }
        }
        match &self.projection {
            Some(projection) => rows.into_iter().map(|b| b.project(projection)).collect(),
            None => rows,
        }
    }

    /// Whether the query has at least one solution.
    pub fn ask(&self, store: &Store) -> bool {
        !self.execute(store).is_empty()
    }
}

/// Renders bindings as a SPARQL 1.1 query results JSON document.
pub fn results_to_json(variables: &[Variable], bindings: &[Binding]) -> Value {
    json!({
        "head": { "vars": variables.iter().map(Variable::as_str).collect::<Vec<_>>() },
        "results": { "bindings": bindings },
    })
}
