//! Bridge between oxigraph's RDF parsers and the store's term model.
//!
//! Concrete syntaxes are never parsed here; `RdfParser` does that. This module
//! picks a format, converts each parsed quad into a [`Quad`] and places triples
//! in the graph the caller names.

use crate::quad::Quad;
use crate::store::Store;
use crate::term::{BlankNode, Literal, NamedNode, Term};
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model as ox;
use std::path::Path;
use url::Url;

/// Formats tried, in order, when the preferred one fails or none is known.
const FALLBACK_FORMATS: [RdfFormat; 5] = [
    RdfFormat::Turtle,
    RdfFormat::RdfXml,
    RdfFormat::NTriples,
    RdfFormat::NQuads,
    RdfFormat::TriG,
];

/// Picks a format from a file extension.
pub fn format_from_extension(ext: &str) -> Option<RdfFormat> {
    match ext {
        "xml" | "owl" => Some(RdfFormat::RdfXml),
        "n3" => Some(RdfFormat::Turtle),
        other => RdfFormat::from_extension(other),
    }
}

fn convert_named_node(node: ox::NamedNode) -> NamedNode {
    NamedNode::new_unchecked(node.into_string())
}

fn convert_blank_node(node: ox::BlankNode) -> BlankNode {
    BlankNode::new_unchecked(node.into_string())
}

fn convert_literal(literal: &ox::Literal) -> Result<Literal> {
    let converted = match literal.language() {
        Some(lang) => Literal::new_language_tagged(literal.value(), lang)?,
        None => Literal::new_typed(
            literal.value(),
            NamedNode::new_unchecked(literal.datatype().as_str()),
        )?,
    };
    Ok(converted)
}

fn convert_subject(subject: ox::NamedOrBlankNode) -> Term {
    match subject {
        ox::NamedOrBlankNode::NamedNode(n) => Term::NamedNode(convert_named_node(n)),
        ox::NamedOrBlankNode::BlankNode(b) => Term::BlankNode(convert_blank_node(b)),
    }
}

fn convert_object(object: ox::Term) -> Result<Term> {
    match object {
        ox::Term::NamedNode(n) => Ok(Term::NamedNode(convert_named_node(n))),
        ox::Term::BlankNode(b) => Ok(Term::BlankNode(convert_blank_node(b))),
        ox::Term::Literal(l) => Ok(Term::Literal(convert_literal(&l)?)),
        #[allow(unreachable_patterns)]
        other => Err(anyhow!("unsupported object term {other}")),
    }
}

/// Converts a parsed quad, moving default-graph triples into `graph`.
fn convert_quad(quad: ox::Quad, graph: &Term) -> Result<Quad> {
    let graph = match quad.graph_name {
        ox::GraphName::DefaultGraph => graph.clone(),
        ox::GraphName::NamedNode(n) => Term::NamedNode(convert_named_node(n)),
        ox::GraphName::BlankNode(b) => Term::BlankNode(convert_blank_node(b)),
    };
    let quad = Quad::new(
        convert_subject(quad.subject),
        Term::NamedNode(convert_named_node(quad.predicate)),
        convert_object(quad.object)?,
        graph,
    )?;
    Ok(quad)
}

fn parse_with_format(
    bytes: &[u8],
    format: RdfFormat,
    base_iri: Option<&str>,
    graph: &Term,
) -> Result<Vec<Quad>> {
    let mut parser = RdfParser::from_format(format).rename_blank_nodes();
    if let Some(base) = base_iri {
        parser = parser.with_base_iri(base)?;
    }
    parser
        .for_reader(std::io::Cursor::new(bytes))
        .map(|parsed| convert_quad(parsed?, graph))
        .collect()
}

/// Parses a whole document into memory.
///
/// `format` is tried first; the remaining formats are tried in a fixed order
/// until one parses the entire document. Triples in the document's default
/// graph are placed in `graph`; quads in named graphs keep their graph. Blank
/// nodes are renamed so they cannot collide with blank nodes already in a store.
/// Returns the quads together with the format that parsed them.
pub fn parse_document(
    bytes: &[u8],
    format: Option<RdfFormat>,
    base_iri: Option<&str>,
    graph: &Term,
) -> Result<(Vec<Quad>, RdfFormat)> {
    let mut candidates = FALLBACK_FORMATS.to_vec();
    if let Some(preferred) = format {
        candidates.retain(|f| *f != preferred);
        candidates.insert(0, preferred);
    }
    let mut first_error: Option<anyhow::Error> = None;
    for candidate in candidates {
        match parse_with_format(bytes, candidate, base_iri, graph) {
            Ok(quads) => {
                debug!("Parsed {} quads as {}", quads.len(), candidate.name());
                return Ok((quads, candidate));
            }
            Err(e) => {
                debug!("Parsing as {} failed: {}", candidate.name(), e);
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error
        .unwrap_or_else(|| anyhow!("no RDF format accepted the document"))
        .context("failed to parse RDF document in any supported format"))
}

/// The `file:` IRI naming the graph a local file is loaded into.
pub fn file_graph(path: &Path) -> Result<Term> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    let url = Url::from_file_path(&absolute)
        .map_err(|_| anyhow!("cannot build a file IRI for {}", absolute.display()))?;
    Ok(Term::iri(url.as_str())?)
}

/// Parses a local file. The format comes from the extension and the file IRI
/// is both the base IRI and the graph.
pub fn parse_file(path: &Path) -> Result<Vec<Quad>> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(format_from_extension);
    let graph = file_graph(path)?;
    let base = graph.as_named_node().map(|n| n.as_str().to_string());
    let (quads, _) = parse_document(&bytes, format, base.as_deref(), &graph)?;
    Ok(quads)
}

/// Parses a local file and adds its quads to `store`, returning how many were new.
pub fn load_file(store: &mut Store, path: &Path) -> Result<usize> {
    let quads = parse_file(path)?;
    let added = store.add_all(quads);
    info!("Loaded {} quads from {}", added, path.display());
    Ok(added)
}
