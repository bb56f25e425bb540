//! The quad store: the public add/remove/match surface over [`QuadIndex`].

use crate::consts::{FIRST, NIL, REST};
use crate::error::{InvalidPatternError, Position, TermError};
use crate::index::QuadIndex;
use crate::quad::Quad;
use crate::term::{BlankNode, NamedNode, Term};
use log::debug;
use rustc_hash::FxHashSet;
use std::sync::{Arc, RwLock};

/// A store shared between tasks: one writer at a time, readers concurrently.
pub type SharedStore = Arc<RwLock<Store>>;

/// A set of quads with pattern lookup.
///
/// In every lookup method a `None` position, or a [`Term::Variable`], matches
/// any term. `None` in the graph position matches every graph, while
/// `Some(&Term::DefaultGraph)` matches only the default graph.
#[derive(Debug, Default, Clone)]
pub struct Store {
    index: QuadIndex,
    next_blank: u64,
}

fn wildcard(term: Option<&Term>) -> Option<&Term> {
    term.filter(|t| !t.is_variable())
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Adds a statement. `graph` defaults to the default graph.
    ///
    /// Returns `Ok(false)` if the quad was already present.
    pub fn add(
        &mut self,
        subject: Term,
        predicate: Term,
        object: Term,
        graph: Option<Term>,
    ) -> Result<bool, TermError> {
        let quad = Quad::new(
            subject,
            predicate,
            object,
            graph.unwrap_or(Term::DefaultGraph),
        )?;
        Ok(self.insert(quad))
    }

    /// Adds an already validated quad.
    pub fn insert(&mut self, quad: Quad) -> bool {
        self.index.insert(&quad)
    }

    /// Inserts every quad in one exclusive borrow and returns how many were new.
    pub fn add_all<I: IntoIterator<Item = Quad>>(&mut self, quads: I) -> usize {
        let added = quads
            .into_iter()
            .filter(|quad| self.index.insert(quad))
            .count();
        debug!("Added {} quads ({} total)", added, self.len());
        added
    }

    /// Removes a statement; removing a missing statement is a no-op.
    pub fn remove(
        &mut self,
        subject: Term,
        predicate: Term,
        object: Term,
        graph: Option<Term>,
    ) -> Result<bool, TermError> {
        let quad = Quad::new(
            subject,
            predicate,
            object,
            graph.unwrap_or(Term::DefaultGraph),
        )?;
        Ok(self.remove_quad(&quad))
    }

    pub fn remove_quad(&mut self, quad: &Quad) -> bool {
        self.index.remove(quad)
    }

    /// Removes every quad matching the pattern and returns the count.
    pub fn remove_matches(
        &mut self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&Term>,
    ) -> usize {
        let doomed = self.match_quads(subject, predicate, object, graph);
        doomed.iter().filter(|q| self.index.remove(q)).count()
    }

    /// Removes every quad in `graph`.
    pub fn remove_graph(&mut self, graph: &Term) -> usize {
        let removed = self.remove_matches(None, None, None, Some(graph));
        if removed > 0 {
            debug!("Removed {removed} quads from graph {graph}");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.index.contains(quad)
    }

    /// All quads matching the pattern, in insertion order.
    pub fn match_quads(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&Term>,
    ) -> Vec<Quad> {
        self.index.scan(&[
            wildcard(subject),
            wildcard(predicate),
            wildcard(object),
            wildcard(graph),
        ])
    }

    /// Whether at least one quad matches.
    pub fn holds(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&Term>,
    ) -> bool {
        self.index.count(&[
            wildcard(subject),
            wildcard(predicate),
            wildcard(object),
            wildcard(graph),
        ]) > 0
    }

    /// The first matching quad in insertion order.
    pub fn any_statement(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&Term>,
    ) -> Option<Quad> {
        self.match_quads(subject, predicate, object, graph)
            .into_iter()
            .next()
    }

    fn unbound_position(
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> Result<Position, InvalidPatternError> {
        let unbound: Vec<Position> = [
            (subject, Position::Subject),
            (predicate, Position::Predicate),
            (object, Position::Object),
        ]
        .into_iter()
        .filter(|(term, _)| wildcard(*term).is_none())
        .map(|(_, position)| position)
        .collect();
        match unbound.as_slice() {
            [position] => Ok(*position),
            _ => Err(InvalidPatternError {
                unbound: unbound.len(),
            }),
        }
    }

    /// The term at the single unbound subject/predicate/object position of the
    /// first match, or `None` if nothing matches.
    ///
    /// Exactly one of subject, predicate and object must be unbound; the graph
    /// may be bound or not.
    pub fn any(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&Term>,
    ) -> Result<Option<Term>, InvalidPatternError> {
        let position = Self::unbound_position(subject, predicate, object)?;
        let pattern = [
            wildcard(subject),
            wildcard(predicate),
            wildcard(object),
            wildcard(graph),
        ];
        Ok(self
            .index
            .scan_position(&pattern, position)
            .into_iter()
            .next()
            .cloned())
    }

    /// Every distinct term at the single unbound position, in first-seen order.
    pub fn each(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&Term>,
    ) -> Result<Vec<Term>, InvalidPatternError> {
        let position = Self::unbound_position(subject, predicate, object)?;
        let pattern = [
            wildcard(subject),
            wildcard(predicate),
            wildcard(object),
            wildcard(graph),
        ];
        let mut seen = FxHashSet::default();
        Ok(self
            .index
            .scan_position(&pattern, position)
            .into_iter()
            .filter(|term| seen.insert(*term))
            .cloned()
            .collect())
    }

    /// Distinct graphs holding at least one quad, in order of first insertion.
    pub fn graphs(&self) -> Vec<Term> {
        self.index.graphs()
    }

    /// Every quad, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Quad> + '_ {
        self.index.iter()
    }

    /// A blank node whose label is not used by any quad in this store.
    pub fn new_blank_node(&mut self) -> BlankNode {
        loop {
            self.next_blank += 1;
            let node = BlankNode::new_unchecked(format!("n{}", self.next_blank));
            if !self.index.has_term(&Term::BlankNode(node.clone())) {
                return node;
            }
        }
    }

    /// Reads an RDF list starting at `head` into a [`Term::Collection`].
    ///
    /// Every node of the list must have exactly one `rdf:first` and one
    /// `rdf:rest`, and the chain must reach `rdf:nil` without revisiting a node.
    pub fn read_collection(&self, head: &Term) -> Option<Term> {
        let first = Term::NamedNode(NamedNode::new_unchecked(FIRST));
        let rest = Term::NamedNode(NamedNode::new_unchecked(REST));
        let nil = Term::NamedNode(NamedNode::new_unchecked(NIL));

        let mut items = Vec::new();
        let mut visited = FxHashSet::default();
        let mut node = head.clone();
        while node != nil {
            if !visited.insert(node.clone()) {
                return None;
            }
            let item = single(self.each(Some(&node), Some(&first), None, None).ok()?)?;
            let next = single(self.each(Some(&node), Some(&rest), None, None).ok()?)?;
            items.push(item);
            node = next;
        }
        Some(Term::Collection(items))
    }
}

fn single(mut terms: Vec<Term>) -> Option<Term> {
    if terms.len() == 1 {
        terms.pop()
    } else {
        None
    }
}

impl Extend<Quad> for Store {
    fn extend<I: IntoIterator<Item = Quad>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

impl FromIterator<Quad> for Store {
    fn from_iter<I: IntoIterator<Item = Quad>>(iter: I) -> Self {
        let mut store = Store::new();
        store.add_all(iter);
        store
    }
}
