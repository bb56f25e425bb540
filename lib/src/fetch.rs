//! Loading remote RDF documents into a shared store.
//!
//! A [`FetchTransport`] retrieves bytes; the [`Fetcher`] parses them completely
//! and only then applies the result to the store under a single write lock.
//! A cancelled load therefore either applied the whole document or nothing.
//!
//! The default [`HttpTransport`] negotiates with a weighted `Accept` header and
//! works out the serialization from the response content type, the URL
//! extension, and finally by sniffing the payload.

use crate::config::Config;
use crate::error::FetchError;
use crate::io::parse_document;
use crate::options::{NetworkMode, Reload};
use crate::store::SharedStore;
use crate::task::Task;
use crate::term::Term;
use async_trait::async_trait;
use chrono::prelude::*;
use log::{debug, info, warn};
use oxigraph::io::RdfFormat;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const DEFAULT_ACCEPT: &[&str] = &[
    "text/turtle",
    "application/n-quads",
    "application/trig",
    "application/rdf+xml",
    "application/n-triples",
    "text/n3",
    "application/xml",
];

/// Bytes of a retrieved document plus what is known about its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    pub format: Option<RdfFormat>,
    /// The URL after redirects, used as the base IRI when parsing.
    pub final_url: String,
    pub content_type: Option<String>,
}

impl FetchResult {
    /// Builds a result, detecting the format from the content type, the URL
    /// extension, and then the payload itself.
    pub fn new(bytes: Vec<u8>, content_type: Option<String>, final_url: String) -> Self {
        let format = content_type
            .as_deref()
            .and_then(detect_format)
            .or_else(|| detect_format_from_url(&final_url))
            .or_else(|| sniff_format(&bytes));
        FetchResult {
            bytes,
            format,
            final_url,
            content_type,
        }
    }
}

/// Retrieves documents by URL. Failures are returned, never panicked.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;
}

/// Attempts to identify an RDF serialization from the supplied media type.
fn detect_format(ct: &str) -> Option<RdfFormat> {
    let media_type = ct.split(';').next().unwrap_or(ct);
    RdfFormat::from_media_type(media_type.trim())
}

/// Builds a weighted `Accept` header string honoring the provided priority order.
fn build_accept(accept_order: &[&str]) -> String {
    if accept_order.is_empty() {
        return "*/*".to_string();
    }
    let mut parts = Vec::new();
    let mut q = 1.0f32;
    for t in accept_order {
        parts.push(format!("{t}; q={:.2}", q));
        q = (q - 0.1f32).max(0.1f32);
    }
    parts.push("*/*; q=0.05".to_string());
    parts.join(", ")
}

/// Attempts to infer an RDF format from the URL path extension.
fn detect_format_from_url(url: &str) -> Option<RdfFormat> {
    let trimmed = url.split('#').next().unwrap_or(url);
    let path = trimmed.split('?').next().unwrap_or(trimmed);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(crate::io::format_from_extension)
}

/// Last-resort guess at the serialization from the first bytes of the payload.
fn sniff_format(bytes: &[u8]) -> Option<RdfFormat> {
    let sample_len = bytes.len().min(4096);
    let sample = match std::str::from_utf8(&bytes[..sample_len]) {
        Ok(s) => s,
        // the cut may fall inside a multi-byte character
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).ok()?,
    };
    let trimmed = sample.trim_start();

    if trimmed.starts_with('<') && (sample.contains("<rdf:RDF") || sample.contains("xmlns:rdf")) {
        return Some(RdfFormat::RdfXml);
    }
    if sample.contains("@prefix") || sample.contains("@base") || sample.contains("PREFIX ") {
        if sample.contains("GRAPH") || sample.contains("} ") {
            return Some(RdfFormat::TriG);
        }
        return Some(RdfFormat::Turtle);
    }
    if trimmed.starts_with('<') || trimmed.starts_with("_:") {
        return Some(RdfFormat::NQuads);
    }
    None
}

/// Returns `true` when the response appears to be HTML instead of RDF.
fn looks_like_html(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if let Some(ct) = content_type {
        let lc = ct.to_ascii_lowercase();
        if lc.contains("text/html") || lc.contains("application/xhtml") {
            return true;
        }
    }
    let prefix_len = bytes.len().min(512);
    match std::str::from_utf8(&bytes[..prefix_len]) {
        Ok(snippet) => {
            let lower = snippet.to_ascii_lowercase();
            lower.contains("<html") || lower.contains("<!doctype html")
        }
        Err(_) => false,
    }
}

/// Fetches documents over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    accept: String,
    mode: NetworkMode,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        let accept = config
            .accept
            .clone()
            .unwrap_or_else(|| build_accept(DEFAULT_ACCEPT));
        Ok(HttpTransport {
            client,
            accept,
            mode: NetworkMode::from(config.offline),
        })
    }
}

#[async_trait]
impl FetchTransport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        if self.mode.is_offline() {
            return Err(FetchError::Offline {
                url: url.to_string(),
            });
        }
        debug!("GET {} (Accept: {})", url, self.accept);
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, &self.accept)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp.bytes().await?.to_vec();
        if looks_like_html(content_type.as_deref(), &bytes) {
            return Err(FetchError::Parse {
                url: final_url,
                message: "server returned HTML instead of RDF".to_string(),
            });
        }
        Ok(FetchResult::new(bytes, content_type, final_url))
    }
}

/// Where a URL stands with respect to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Requested,
    Loaded {
        /// blake3 hash of the document bytes, hex encoded
        hash: String,
        quads: usize,
        fetched_at: DateTime<Utc>,
    },
    Failed(String),
}

/// What a completed load did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The graph the document's triples were placed in.
    pub graph: Term,
    pub quads_added: usize,
    /// The document matched the previously loaded content and was not re-applied.
    pub unchanged: bool,
}

/// Marks a load as failed if its future is dropped before finishing.
struct PendingLoad<'a> {
    fetcher: &'a Fetcher,
    url: &'a str,
    armed: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Load of {} was cancelled", self.url);
            let _ = self
                .fetcher
                .set_status(self.url, FetchStatus::Failed("cancelled".to_string()));
        }
    }
}

/// Loads remote documents into a [`SharedStore`], one graph per document URL.
#[derive(Clone)]
pub struct Fetcher {
    store: SharedStore,
    transport: Arc<dyn FetchTransport>,
    status: Arc<Mutex<HashMap<String, FetchStatus>>>,
    /// Every graph the last applied version of each URL wrote to.
    graphs: Arc<Mutex<HashMap<String, Vec<Term>>>>,
    reload: Reload,
}

impl Fetcher {
    pub fn new(store: SharedStore, transport: Arc<dyn FetchTransport>) -> Self {
        Fetcher {
            store,
            transport,
            status: Arc::new(Mutex::new(HashMap::new())),
            graphs: Arc::new(Mutex::new(HashMap::new())),
            reload: Reload::default(),
        }
    }

    /// A fetcher using [`HttpTransport`] and the reload policy from `config`.
    pub fn from_config(store: SharedStore, config: &Config) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(store, Arc::new(transport)).with_reload(config.reload))
    }

    pub fn with_reload(mut self, reload: Reload) -> Self {
        self.reload = reload;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn status(&self, url: &str) -> Option<FetchStatus> {
        self.status.lock().ok()?.get(url).cloned()
    }

    /// Every URL this fetcher has seen, sorted.
    pub fn statuses(&self) -> Vec<(String, FetchStatus)> {
        let Ok(map) = self.status.lock() else {
            return Vec::new();
        };
        let mut all: Vec<(String, FetchStatus)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// The graphs `url` wrote to when it was last applied, document graph first.
    pub fn loaded_graphs(&self, url: &str) -> Vec<Term> {
        self.graphs
            .lock()
            .ok()
            .and_then(|map| map.get(url).cloned())
            .unwrap_or_default()
    }

    fn set_status(&self, url: &str, status: FetchStatus) -> Result<(), FetchError> {
        let mut map = self.status.lock().map_err(|_| FetchError::Lock)?;
        map.insert(url.to_string(), status);
        Ok(())
    }

    /// Starts loading `url` in the background.
    pub fn load(&self, url: &str) -> Task<LoadOutcome, FetchError> {
        let this = self.clone();
        let url = url.to_string();
        Task::spawn(async move { this.load_now(&url).await })
    }

    /// Fetches, parses and applies `url`, replacing its graph if it was loaded before.
    pub async fn load_now(&self, url: &str) -> Result<LoadOutcome, FetchError> {
        let graph = Term::iri(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let previous = self.status(url);
        self.set_status(url, FetchStatus::Requested)?;
        let mut pending = PendingLoad {
            fetcher: self,
            url,
            armed: true,
        };
        let result = self.fetch_and_apply(url, graph, previous).await;
        pending.armed = false;
        match &result {
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to load {}: {}", url, e);
                self.set_status(url, FetchStatus::Failed(e.to_string()))?;
            }
        }
        result
    }

    async fn fetch_and_apply(
        &self,
        url: &str,
        graph: Term,
        previous: Option<FetchStatus>,
    ) -> Result<LoadOutcome, FetchError> {
        let fetched = self.transport.fetch(url).await?;
        let hash = blake3::hash(&fetched.bytes).to_hex().to_string();

        if let Some(FetchStatus::Loaded {
            hash: old_hash,
            quads,
            ..
        }) = &previous
        {
            if !self.reload.is_always() && *old_hash == hash {
                info!("{} is unchanged, keeping loaded graph", url);
                self.set_status(
                    url,
                    FetchStatus::Loaded {
                        hash,
                        quads: *quads,
                        fetched_at: Utc::now(),
                    },
                )?;
                return Ok(LoadOutcome {
                    graph,
                    quads_added: 0,
                    unchanged: true,
                });
            }
        }

        let (quads, format) = parse_document(
            &fetched.bytes,
            fetched.format,
            Some(&fetched.final_url),
            &graph,
        )
        .map_err(|e| FetchError::Parse {
            url: url.to_string(),
            message: format!("{e:#}"),
        })?;
        debug!("Parsed {} quads from {} as {}", quads.len(), url, format.name());
        let parsed = quads.len();
        let mut written = vec![graph.clone()];
        for quad in &quads {
            if !written.contains(quad.graph()) {
                written.push(quad.graph().clone());
            }
        }

        // No await from here on: the document is applied in one critical section.
        let added = {
            let mut store = self.store.write().map_err(|_| FetchError::Lock)?;
            let mut graphs = self.graphs.lock().map_err(|_| FetchError::Lock)?;
            let mut stale = graphs.remove(url).unwrap_or_default();
            if !stale.contains(&graph) {
                stale.push(graph.clone());
            }
            for old in &stale {
                let removed = store.remove_graph(old);
                if removed > 0 {
                    debug!("Replacing {} quads of {}", removed, old);
                }
            }
            graphs.insert(url.to_string(), written);
            store.add_all(quads)
        };
        info!("Loaded {} quads from {}", added, url);
        self.set_status(
            url,
            FetchStatus::Loaded {
                hash,
                quads: parsed,
                fetched_at: Utc::now(),
            },
        )?;
        Ok(LoadOutcome {
            graph,
            quads_added: added,
            unchanged: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_header_is_weighted() {
        let accept = build_accept(&["text/turtle", "application/rdf+xml"]);
        assert_eq!(
            accept,
            "text/turtle; q=1.00, application/rdf+xml; q=0.90, */*; q=0.05"
        );
        assert_eq!(build_accept(&[]), "*/*");
    }

    #[test]
    fn format_detection_order() {
        let r = FetchResult::new(
            b"@prefix ex: <http://example.org/> .".to_vec(),
            Some("application/rdf+xml; charset=utf-8".into()),
            "http://example.org/doc.ttl".into(),
        );
        assert_eq!(r.format, Some(RdfFormat::RdfXml));

        let r = FetchResult::new(Vec::new(), None, "http://example.org/doc.nt?x=1".into());
        assert_eq!(r.format, Some(RdfFormat::NTriples));

        let r = FetchResult::new(
            b"@prefix ex: <http://example.org/> .".to_vec(),
            None,
            "http://example.org/doc".into(),
        );
        assert_eq!(r.format, Some(RdfFormat::Turtle));
    }

    #[test]
    fn html_is_detected() {
        assert!(looks_like_html(Some("text/html; charset=utf-8"), b""));
        assert!(looks_like_html(None, b"<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html(Some("text/turtle"), b"@prefix ex: <x> ."));
    }

    #[tokio::test]
    async fn offline_transport_refuses() {
        let config = Config::builder().offline(true).build().unwrap();
        let transport = HttpTransport::new(&config).unwrap();
        let err = transport.fetch("http://example.org/doc").await.unwrap_err();
        assert!(matches!(err, FetchError::Offline { .. }));
    }
}
