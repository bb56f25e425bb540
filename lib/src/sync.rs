//! Pushing local graph edits to a remote resource.
//!
//! The flow is: snapshot a graph, edit the store, snapshot again, and send the
//! [`Diff`] between the two snapshots through an [`UpdateTransport`]. Local
//! state is never rolled back by the updater; a caller that wants to undo an
//! edit after a rejected update can use [`Diff::revert`].

use crate::config::Config;
use crate::consts::{FIRST, NIL, REST};
use crate::error::UpdateError;
use crate::options::NetworkMode;
use crate::quad::Quad;
use crate::store::{SharedStore, Store};
use crate::task::Task;
use crate::term::Term;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;
use std::sync::Arc;

pub const SPARQL_UPDATE_MEDIA_TYPE: &str = "application/sparql-update";

/// The quads of one graph at a point in time, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    graph: Term,
    quads: Vec<Quad>,
}

impl Snapshot {
    pub fn graph(&self) -> &Term {
        &self.graph
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }
}

/// Quads to delete and to insert to turn one snapshot into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub to_delete: Vec<Quad>,
    pub to_insert: Vec<Quad>,
}

impl Diff {
    /// `to_delete` is `before − after` and `to_insert` is `after − before`,
    /// each kept in snapshot order.
    pub fn between(before: &Snapshot, after: &Snapshot) -> Self {
        let before_set: FxHashSet<&Quad> = before.quads.iter().collect();
        let after_set: FxHashSet<&Quad> = after.quads.iter().collect();
        Diff {
            to_delete: before
                .quads
                .iter()
                .filter(|q| !after_set.contains(q))
                .cloned()
                .collect(),
            to_insert: after
                .quads
                .iter()
                .filter(|q| !before_set.contains(q))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }

    /// Total number of quads touched.
    pub fn len(&self) -> usize {
        self.to_delete.len() + self.to_insert.len()
    }

    /// Applies the diff to a store.
    pub fn apply_to(&self, store: &mut Store) {
        for quad in &self.to_delete {
            store.remove_quad(quad);
        }
        store.add_all(self.to_insert.iter().cloned());
    }

    /// Undoes the diff locally: removes what it inserted and restores what it deleted.
    pub fn revert(&self, store: &mut Store) {
        for quad in &self.to_insert {
            store.remove_quad(quad);
        }
        store.add_all(self.to_delete.iter().cloned());
    }

    /// Renders the diff as a SPARQL 1.1 Update request, with every named graph
    /// in a `GRAPH` block.
    pub fn to_sparql_update(&self) -> Result<String, UpdateError> {
        self.to_sparql_update_for(None)
    }

    /// Renders the diff as a SPARQL 1.1 Update request addressed to `target`:
    /// quads in `target`'s graph (or the default graph) are written as plain
    /// triples, other graphs get `GRAPH` blocks.
    ///
    /// Blank nodes may not appear in `DELETE DATA`, so deletions that mention
    /// them (directly, through a collection, or as the graph name) are sent as
    /// `DELETE { … } WHERE { … }` with each blank node replaced by a variable.
    /// Insertions into a blank-node graph cannot be expressed and fail with
    /// [`UpdateError::BlankGraph`].
    pub fn to_sparql_update_for(&self, target: Option<&Term>) -> Result<String, UpdateError> {
        if let Some(quad) = self.to_insert.iter().find(|q| q.graph().is_blank_node()) {
            return Err(UpdateError::BlankGraph(quad.graph().to_string()));
        }
        let (with_blanks, ground): (Vec<&Quad>, Vec<&Quad>) =
            self.to_delete.iter().partition(|q| needs_pattern(q));
        let mut operations = Vec::new();
        if !ground.is_empty() {
            let body = render_block(&ground, target, &mut Renderer::Data);
            operations.push(format!("DELETE DATA {{\n{body}}}"));
        }
        if !with_blanks.is_empty() {
            let mut vars = Renderer::pattern();
            let template = render_block(&with_blanks, target, &mut vars);
            let pattern = render_block(&with_blanks, target, &mut vars);
            operations.push(format!("DELETE {{\n{template}}}\nWHERE {{\n{pattern}}}"));
        }
        if !self.to_insert.is_empty() {
            let inserts: Vec<&Quad> = self.to_insert.iter().collect();
            let body = render_block(&inserts, target, &mut Renderer::Data);
            operations.push(format!("INSERT DATA {{\n{body}}}"));
        }
        Ok(operations.join(" ;\n"))
    }
}

/// Collections are lists of blank nodes once written as SPARQL, so they count
/// as blank nodes here too.
fn needs_pattern(quad: &Quad) -> bool {
    let blankish = |t: &Term| t.contains_blank_node() || matches!(t, Term::Collection(_));
    blankish(quad.subject()) || blankish(quad.object()) || quad.graph().is_blank_node()
}

/// How terms are written: as-is, or as a pattern with blank nodes turned into
/// variables and collections spelled out as `rdf:first`/`rdf:rest` chains.
enum Renderer {
    Data,
    Variables(PatternVars),
}

#[derive(Default)]
struct PatternVars {
    blanks: FxHashMap<String, String>,
    /// List nodes allocated in the current block; reset per block so the
    /// template and the pattern name them identically.
    list_nodes: usize,
    /// Triples describing list nodes, written after the triple that uses them.
    pending: Vec<String>,
}

impl Renderer {
    fn pattern() -> Self {
        Renderer::Variables(PatternVars::default())
    }

    fn start_block(&mut self) {
        if let Renderer::Variables(vars) = self {
            vars.list_nodes = 0;
            vars.pending.clear();
        }
    }

    fn take_pending(&mut self) -> Vec<String> {
        match self {
            Renderer::Variables(vars) => std::mem::take(&mut vars.pending),
            Renderer::Data => Vec::new(),
        }
    }

    fn term(&mut self, term: &Term) -> String {
        let Renderer::Variables(vars) = self else {
            return term.to_string();
        };
        match term {
            Term::BlankNode(b) => {
                let next = vars.blanks.len();
                vars.blanks
                    .entry(b.as_str().to_string())
                    .or_insert_with(|| format!("?b{next}"))
                    .clone()
            }
            Term::Collection(items) => self.list(items),
            other => other.to_string(),
        }
    }

    fn list(&mut self, items: &[Term]) -> String {
        let nil = format!("<{NIL}>");
        let Renderer::Variables(vars) = self else {
            return Term::Collection(items.to_vec()).to_string();
        };
        if items.is_empty() {
            return nil;
        }
        let start = vars.list_nodes;
        vars.list_nodes += items.len();
        let nodes: Vec<String> = (start..start + items.len()).map(|i| format!("?l{i}")).collect();
        for (i, item) in items.iter().enumerate() {
            let first = self.term(item);
            let rest = nodes.get(i + 1).unwrap_or(&nil);
            if let Renderer::Variables(vars) = self {
                vars.pending.push(format!("{} <{FIRST}> {first} .", nodes[i]));
                vars.pending.push(format!("{} <{REST}> {rest} .", nodes[i]));
            }
        }
        nodes[0].clone()
    }
}

/// Triples grouped by graph, in order of first appearance.
fn render_block(quads: &[&Quad], target: Option<&Term>, renderer: &mut Renderer) -> String {
    renderer.start_block();
    let mut groups: Vec<(&Term, Vec<&Quad>)> = Vec::new();
    for &quad in quads {
        match groups.iter_mut().find(|(g, _)| *g == quad.graph()) {
            Some((_, members)) => members.push(quad),
            None => groups.push((quad.graph(), vec![quad])),
        }
    }
    let mut out = String::new();
    for (graph, members) in groups {
        let plain = graph.is_default_graph() || Some(graph) == target;
        let indent = if plain { "  " } else { "    " };
        if !plain {
            let _ = writeln!(out, "  GRAPH {} {{", renderer.term(graph));
        }
        for quad in members {
            let _ = writeln!(
                out,
                "{indent}{} {} {} .",
                renderer.term(quad.subject()),
                renderer.term(quad.predicate()),
                renderer.term(quad.object()),
            );
            for line in renderer.take_pending() {
                let _ = writeln!(out, "{indent}{line}");
            }
        }
        if !plain {
            let _ = writeln!(out, "  }}");
        }
    }
    out
}

/// Sends a diff to a remote resource.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn update(&self, target: &Term, diff: &Diff) -> Result<(), UpdateError>;
}

/// Sends diffs as SPARQL Update requests over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpdateTransport {
    client: Client,
    method: Method,
    mode: NetworkMode,
}

impl HttpUpdateTransport {
    pub fn new(config: &Config) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        let method = Method::from_bytes(config.update_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                UpdateError::Transport(format!("invalid HTTP method '{}'", config.update_method))
            })?;
        Ok(HttpUpdateTransport {
            client,
            method,
            mode: NetworkMode::from(config.offline),
        })
    }
}

#[async_trait]
impl UpdateTransport for HttpUpdateTransport {
    async fn update(&self, target: &Term, diff: &Diff) -> Result<(), UpdateError> {
        let Some(url) = target.as_named_node() else {
            return Err(UpdateError::InvalidTarget(target.to_string()));
        };
        if self.mode.is_offline() {
            return Err(UpdateError::Offline {
                target: url.as_str().to_string(),
            });
        }
        let body = diff.to_sparql_update_for(Some(target))?;
        debug!("{} {} ({} bytes)", self.method, url.as_str(), body.len());
        let resp = self
            .client
            .request(self.method.clone(), url.as_str())
            .header(CONTENT_TYPE, SPARQL_UPDATE_MEDIA_TYPE)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(rejection(status.as_u16(), resp.text().await))
    }
}

/// A rejected update keeps the server's explanation, or says why it is missing.
fn rejection(status: u16, body: Result<String, impl std::fmt::Display>) -> UpdateError {
    let message = match body {
        Ok(body) => body,
        Err(e) => format!("(failed to read response body: {e})"),
    };
    UpdateError::Rejected { status, message }
}

/// Computes diffs of local edits and hands them to an [`UpdateTransport`].
#[derive(Clone)]
pub struct SyncUpdater {
    transport: Arc<dyn UpdateTransport>,
}

impl SyncUpdater {
    pub fn new(transport: Arc<dyn UpdateTransport>) -> Self {
        SyncUpdater { transport }
    }

    /// An updater using [`HttpUpdateTransport`].
    pub fn from_config(config: &Config) -> Result<Self, UpdateError> {
        Ok(Self::new(Arc::new(HttpUpdateTransport::new(config)?)))
    }

    /// All quads currently in `graph`.
    pub fn snapshot(store: &Store, graph: &Term) -> Snapshot {
        Snapshot {
            graph: graph.clone(),
            quads: store.match_quads(None, None, None, Some(graph)),
        }
    }

    /// Runs `edit` under one write lock and returns its result together with
    /// the diff it caused in `graph`.
    pub fn edit<R, F>(store: &SharedStore, graph: &Term, edit: F) -> Result<(R, Diff), UpdateError>
    where
        F: FnOnce(&mut Store) -> R,
    {
        let mut guard = store.write().map_err(|_| UpdateError::Lock)?;
        let before = Self::snapshot(&guard, graph);
        let result = edit(&mut *guard);
        let after = Self::snapshot(&guard, graph);
        Ok((result, Diff::between(&before, &after)))
    }

    /// Sends `diff` to `target`. An empty diff succeeds without contacting the
    /// transport. On failure nothing local is undone.
    pub async fn apply(&self, target: &Term, diff: &Diff) -> Result<(), UpdateError> {
        if diff.is_empty() {
            debug!("Nothing to send to {}", target);
            return Ok(());
        }
        match self.transport.update(target, diff).await {
            Ok(()) => {
                info!(
                    "Updated {}: {} deleted, {} inserted",
                    target,
                    diff.to_delete.len(),
                    diff.to_insert.len()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Update of {} failed: {}", target, e);
                Err(e)
            }
        }
    }

    /// Like [`SyncUpdater::apply`], in the background.
    pub fn spawn_apply(&self, target: Term, diff: Diff) -> Task<(), UpdateError> {
        let this = self.clone();
        Task::spawn(async move { this.apply(&target, &diff).await })
    }
}
