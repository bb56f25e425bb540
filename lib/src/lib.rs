//! An in-memory RDF quad store.
//!
//! [`Store`] holds quads and answers pattern lookups (`match_quads`, `any`,
//! `each`). [`PatternQuery`] evaluates basic graph patterns over a store.
//! [`Fetcher`] loads remote documents into a [`SharedStore`], and
//! [`SyncUpdater`] pushes local edits of a graph to a remote resource as
//! SPARQL Update requests.
//!
//! ```no_run
//! use tetrad::{PatternQuery, Store, Term};
//!
//! # fn main() -> anyhow::Result<()> {
//! let ex = |s: &str| Term::iri(format!("http://example.org/{s}"));
//! let mut store = Store::new();
//! store.add(ex("alice")?, ex("knows")?, ex("bob")?, None)?;
//! let query = PatternQuery::parse("PREFIX ex: <http://example.org/> { ?x ex:knows ?y }")?;
//! for binding in query.execute(&store) {
//!     println!("{:?} knows {:?}", binding.get("x"), binding.get("y"));
//! }
//! # Ok(())
//! # }
//! ```

extern crate derive_builder;

pub mod config;
pub mod consts;
pub mod error;
pub mod fetch;
pub mod index;
pub mod io;
pub mod namespace;
pub mod options;
pub mod quad;
pub mod query;
pub mod store;
pub mod sync;
pub mod task;
pub mod term;

pub use config::Config;
pub use error::{
    FetchError, InvalidPatternError, MalformedQueryError, Position, TermError, UpdateError,
};
pub use fetch::{FetchResult, FetchStatus, FetchTransport, Fetcher, HttpTransport, LoadOutcome};
pub use namespace::{Namespace, PrefixMap};
pub use options::{NetworkMode, PatternOrder, Reload};
pub use quad::Quad;
pub use query::{Binding, PatternQuery, QuadPattern};
pub use store::{SharedStore, Store};
pub use sync::{Diff, HttpUpdateTransport, Snapshot, SyncUpdater, UpdateTransport};
pub use task::{Cancellable, Task};
pub use term::{BlankNode, Literal, NamedNode, Term, Variable};

/// Lets `TETRAD_LOG` override `RUST_LOG`.
///
/// Call this before initializing a logger such as `env_logger` for the level
/// to take effect.
pub fn init_logging() {
    if let Ok(log_level) = std::env::var("TETRAD_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}
