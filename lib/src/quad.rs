//! The immutable subject/predicate/object/graph tuple held by a [`crate::store::Store`].

use crate::error::{Position, TermError};
use crate::term::Term;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quad {
    subject: Term,
    predicate: Term,
    object: Term,
    graph: Term,
}

impl Quad {
    /// Builds a quad, checking that each term may occupy its position.
    pub fn new(subject: Term, predicate: Term, object: Term, graph: Term) -> Result<Self, TermError> {
        check_position(&subject, Position::Subject)?;
        check_position(&predicate, Position::Predicate)?;
        check_position(&object, Position::Object)?;
        check_position(&graph, Position::Graph)?;
        Ok(Quad {
            subject,
            predicate,
            object,
            graph,
        })
    }

    /// For terms that already passed [`Quad::new`], such as those read back from an index.
    pub(crate) fn new_unchecked(subject: Term, predicate: Term, object: Term, graph: Term) -> Self {
        Quad {
            subject,
            predicate,
            object,
            graph,
        }
    }

    /// Builds a quad in the default graph.
    pub fn triple(subject: Term, predicate: Term, object: Term) -> Result<Self, TermError> {
        Self::new(subject, predicate, object, Term::DefaultGraph)
    }

    pub fn subject(&self) -> &Term {
        &self.subject
    }

    pub fn predicate(&self) -> &Term {
        &self.predicate
    }

    pub fn object(&self) -> &Term {
        &self.object
    }

    pub fn graph(&self) -> &Term {
        &self.graph
    }

    /// The term at `position`.
    pub fn get(&self, position: Position) -> &Term {
        match position {
            Position::Subject => &self.subject,
            Position::Predicate => &self.predicate,
            Position::Object => &self.object,
            Position::Graph => &self.graph,
        }
    }

    pub fn into_parts(self) -> (Term, Term, Term, Term) {
        (self.subject, self.predicate, self.object, self.graph)
    }

    /// Same triple, moved into `graph`.
    pub fn in_graph(&self, graph: Term) -> Result<Self, TermError> {
        check_position(&graph, Position::Graph)?;
        Ok(Quad {
            graph,
            ..self.clone()
        })
    }
}

/// Position rules: subjects are IRIs or blank nodes, predicates are IRIs,
/// objects are anything but variables and the graph marker, and graphs are
/// IRIs, blank nodes or the default graph.
pub(crate) fn check_position(term: &Term, position: Position) -> Result<(), TermError> {
    let ok = match position {
        Position::Subject => matches!(term, Term::NamedNode(_) | Term::BlankNode(_)),
        Position::Predicate => matches!(term, Term::NamedNode(_)),
        Position::Object => match term {
            Term::NamedNode(_) | Term::BlankNode(_) | Term::Literal(_) => true,
            Term::Collection(items) => items
                .iter()
                .all(|item| check_position(item, Position::Object).is_ok()),
            Term::Variable(_) | Term::DefaultGraph => false,
        },
        Position::Graph => matches!(
            term,
            Term::NamedNode(_) | Term::BlankNode(_) | Term::DefaultGraph
        ),
    };
    if ok {
        Ok(())
    } else {
        Err(TermError::InvalidPosition {
            position,
            term: term.to_string(),
        })
    }
}

impl fmt::Display for Quad {
    /// N-Quads syntax without the terminating newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if !self.graph.is_default_graph() {
            write!(f, " {}", self.graph)?;
        }
        write!(f, " .")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Literal;

    fn iri(s: &str) -> Term {
        Term::iri(format!("http://example.org/{s}")).unwrap()
    }

    #[test]
    fn positions_are_checked() {
        let lit = Term::Literal(Literal::new_simple("x"));
        assert!(Quad::triple(iri("a"), iri("p"), lit.clone()).is_ok());
        assert!(Quad::triple(lit.clone(), iri("p"), iri("b")).is_err());
        assert!(Quad::triple(iri("a"), Term::blank("b").unwrap(), iri("b")).is_err());
        assert!(Quad::new(iri("a"), iri("p"), iri("b"), lit).is_err());
        assert!(Quad::triple(iri("a"), iri("p"), Term::variable("x").unwrap()).is_err());
    }

    #[test]
    fn nquads_display() {
        let q = Quad::new(iri("a"), iri("p"), Term::literal("v"), iri("g")).unwrap();
        assert_eq!(
            q.to_string(),
            "<http://example.org/a> <http://example.org/p> \"v\" <http://example.org/g> ."
        );
        let t = Quad::triple(iri("a"), iri("p"), iri("b")).unwrap();
        assert!(t.to_string().ends_with("<http://example.org/b> ."));
    }
}
