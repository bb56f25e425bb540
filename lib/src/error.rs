//! Error types for the store, query, fetch and sync layers.
//!
//! Absence of data is never an error: lookups that find nothing return empty
//! results. The types here cover structural misuse (bad terms, bad patterns,
//! malformed queries) and remote failures.

use thiserror::Error;

/// A term could not be constructed, or was used in a position it cannot occupy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TermError {
    #[error("invalid IRI <{iri}>: {message}")]
    InvalidIri { iri: String, message: String },

    #[error("literal \"{lexical}\" cannot carry both a language tag and a datatype")]
    LanguageAndDatatype { lexical: String },

    #[error("invalid language tag '{0}'")]
    InvalidLanguageTag(String),

    #[error("invalid blank node label '{0}'")]
    InvalidBlankNode(String),

    #[error("invalid variable name '{0}'")]
    InvalidVariable(String),

    #[error("rdf:langString literal \"{0}\" requires a language tag")]
    MissingLanguageTag(String),

    #[error("{term} cannot be used as the {position} of a quad")]
    InvalidPosition { position: Position, term: String },
}

/// Quad positions, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Subject,
    Predicate,
    Object,
    Graph,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Subject => write!(f, "subject"),
            Position::Predicate => write!(f, "predicate"),
            Position::Object => write!(f, "object"),
            Position::Graph => write!(f, "graph"),
        }
    }
}

/// `each`/`any` require exactly one of subject, predicate and object to be unbound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected exactly one unbound position among subject/predicate/object, found {unbound}")]
pub struct InvalidPatternError {
    pub unbound: usize,
}

/// A pattern query could not be built from text or from patterns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed query at offset {position} near '{token}': {message}")]
pub struct MalformedQueryError {
    pub message: String,
    pub token: String,
    pub position: usize,
}

impl MalformedQueryError {
    pub fn new(message: impl Into<String>, token: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            token: token.into(),
            position,
        }
    }
}

/// A remote update failed. Local state is left as the caller made it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("update transport failed: {0}")]
    Transport(String),

    #[error("remote rejected update ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("cannot update {target} while offline")]
    Offline { target: String },

    #[error("update target {0} is not an IRI")]
    InvalidTarget(String),

    #[error("cannot insert into blank node graph {0}: SPARQL Update graph names must be IRIs")]
    BlankGraph(String),

    #[error("update was cancelled")]
    Cancelled,

    #[error("failed to lock store")]
    Lock,
}

/// A remote fetch, or the parse that follows it, failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("failed to fetch {url}: offline mode is enabled")]
    Offline { url: String },

    #[error("fetch transport failed: {0}")]
    Transport(String),

    #[error("fetching {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("invalid document IRI: {0}")]
    InvalidUrl(String),

    #[error("fetch was cancelled")]
    Cancelled,

    #[error("failed to lock store")]
    Lock,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        UpdateError::Transport(e.to_string())
    }
}
