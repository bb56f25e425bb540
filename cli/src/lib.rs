use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::io::Write;
use std::path::{Path, PathBuf};
use tetrad::io::{format_from_extension, load_file, parse_document};
use tetrad::query::{parse_term_with, results_to_json};
use tetrad::{
    Config, Diff, Fetcher, PatternOrder, PatternQuery, PrefixMap, SharedStore, Store, SyncUpdater,
    Term,
};

#[derive(Debug, Parser)]
#[command(name = "tetrad")]
#[command(about = "Load, match, query and sync RDF quads")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// RDF file to load before running the command; repeat for more files. Each
    /// file becomes its own graph
    #[clap(long, short, action = clap::ArgAction::Append, global = true)]
    load: Vec<PathBuf>,
    /// JSON configuration file, see `tetrad config`
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    /// Extra prefix for compact IRIs, given as `prefix=namespace`; repeatable
    #[clap(long, action = clap::ArgAction::Append, global = true)]
    prefix: Vec<String>,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
    /// Offline mode - fetch and patch fail instead of touching the network
    #[clap(long, short, action, default_value = "false", global = true)]
    offline: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the number of quads in each loaded graph
    Stats,
    /// Print the quads matching a pattern. Use `_` or a `?variable` for a wildcard
    Match {
        subject: String,
        predicate: String,
        object: String,
        /// Restrict matches to this graph; `DEFAULT` names the default graph
        graph: Option<String>,
    },
    /// Print every distinct term at the single wildcard position of a pattern
    Each {
        subject: String,
        predicate: String,
        object: String,
        graph: Option<String>,
    },
    /// Run a basic graph pattern query
    Query {
        /// The query text, e.g. `SELECT ?x WHERE { ?x a ex:Person }`
        query: String,
        /// Print SPARQL JSON results instead of a table
        #[clap(long, action)]
        json: bool,
        /// Pattern evaluation order: `source` or `selectivity`
        #[clap(long)]
        order: Option<PatternOrder>,
    },
    /// Fetch RDF documents and load each into the graph named by its URL
    Fetch {
        #[clap(required = true)]
        urls: Vec<String>,
    },
    /// Print the SPARQL Update that turns a loaded graph into the contents of a file
    Diff {
        /// The graph to compare, as an IRI or compact IRI
        graph: String,
        /// The file holding the desired contents of the graph
        file: PathBuf,
    },
    /// Send the SPARQL Update that turns a loaded graph into the contents of a file
    Patch {
        /// The graph to update; the update is sent to this IRI
        graph: String,
        file: PathBuf,
    },
    /// Print the effective configuration, or write it to a file
    Config {
        /// Write the configuration as JSON to this path
        #[clap(long)]
        save: Option<PathBuf>,
    },
}

impl std::fmt::Display for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Commands::Stats => "stats",
            Commands::Match { .. } => "match",
            Commands::Each { .. } => "each",
            Commands::Query { .. } => "query",
            Commands::Fetch { .. } => "fetch",
            Commands::Diff { .. } => "diff",
            Commands::Patch { .. } => "patch",
            Commands::Config { .. } => "config",
        };
        f.write_str(name)
    }
}

pub fn run() -> Result<()> {
    let cmd = Cli::parse();
    execute(cmd, &mut std::io::stdout().lock())
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    run_from_args_to(args, &mut std::io::stdout().lock())
}

/// Like [`run_from_args`], writing command output to `out`.
pub fn run_from_args_to<I, T, W>(args: I, out: &mut W) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    W: Write,
{
    let cmd = Cli::try_parse_from(args).map_err(|e| anyhow!(e.to_string()))?;
    execute(cmd, out)
}

fn init_logging(cmd: &Cli) {
    tetrad::init_logging();
    let log_level = if cmd.debug {
        Some("debug")
    } else if cmd.verbose {
        Some("info")
    } else {
        None
    };
    if let Some(level) = log_level {
        std::env::set_var("RUST_LOG", level);
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    // a second initialization (e.g. repeated runs in tests) is harmless
    let _ = env_logger::try_init();
}

fn load_config(cmd: &Cli) -> Result<Config> {
    let mut config = match &cmd.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("cannot read config {}", path.display()))?,
        None => Config::default(),
    };
    if cmd.offline {
        config.offline = true;
    }
    Ok(config)
}

fn prefix_map(prefixes: &[String]) -> Result<PrefixMap> {
    let mut map = PrefixMap::with_defaults();
    for entry in prefixes {
        let (prefix, namespace) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Prefix '{}' must look like prefix=namespace", entry))?;
        map.insert(prefix, namespace);
    }
    Ok(map)
}

/// `_` is a wildcard; anything else is parsed as a term. A variable is also a
/// wildcard when matching.
fn pattern_term(text: &str, prefixes: &PrefixMap) -> Result<Option<Term>> {
    if text == "_" {
        return Ok(None);
    }
    Ok(Some(parse_term_with(text, prefixes)?))
}

fn graph_term(text: Option<&str>, prefixes: &PrefixMap) -> Result<Option<Term>> {
    match text {
        None => Ok(None),
        Some("DEFAULT") => Ok(Some(Term::DefaultGraph)),
        Some(text) => pattern_term(text, prefixes),
    }
}

fn named_graph(text: &str, prefixes: &PrefixMap) -> Result<Term> {
    Ok(Term::NamedNode(prefixes.resolve(text)?))
}

fn load_store(files: &[PathBuf]) -> Result<Store> {
    let mut store = Store::new();
    for file in files {
        load_file(&mut store, file)?;
    }
    info!("Loaded {} quads from {} files", store.len(), files.len());
    Ok(store)
}

/// Parses `file` as the new contents of `graph`.
fn read_graph_file(file: &Path, graph: &Term) -> Result<Vec<tetrad::Quad>> {
    let bytes = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let format = file
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(format_from_extension);
    let base = graph.as_named_node().map(|n| n.as_str().to_string());
    let (quads, _) = parse_document(&bytes, format, base.as_deref(), graph)?;
    Ok(quads)
}

fn graph_diff(store: Store, graph: &Term, file: &Path) -> Result<Diff> {
    let replacement = read_graph_file(file, graph)?;
    let shared = store.into_shared();
    let (_, diff) = SyncUpdater::edit(&shared, graph, |store| {
        store.remove_graph(graph);
        store.add_all(replacement.into_iter().filter(|q| q.graph() == graph));
    })?;
    Ok(diff)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn execute<W: Write>(cmd: Cli, out: &mut W) -> Result<()> {
    init_logging(&cmd);
    let config = load_config(&cmd)?;
    if cmd.verbose || cmd.debug {
        config.print();
    }
    let prefixes = prefix_map(&cmd.prefix)?;
    debug!("Running {}", cmd.command);
    let store = load_store(&cmd.load)?;

    match cmd.command {
        Commands::Stats => {
            writeln!(out, "{} quads", store.len())?;
            for graph in store.graphs() {
                let count = store.match_quads(None, None, None, Some(&graph)).len();
                let name = if graph.is_default_graph() {
                    "(default graph)".to_string()
                } else {
                    prefixes.display(&graph)
                };
                writeln!(out, "{name}\t{count}")?;
            }
        }
        Commands::Match {
            subject,
            predicate,
            object,
            graph,
        } => {
            let s = pattern_term(&subject, &prefixes)?;
            let p = pattern_term(&predicate, &prefixes)?;
            let o = pattern_term(&object, &prefixes)?;
            let g = graph_term(graph.as_deref(), &prefixes)?;
            for quad in store.match_quads(s.as_ref(), p.as_ref(), o.as_ref(), g.as_ref()) {
                writeln!(out, "{quad}")?;
            }
        }
        Commands::Each {
            subject,
            predicate,
            object,
            graph,
        } => {
            let s = pattern_term(&subject, &prefixes)?;
            let p = pattern_term(&predicate, &prefixes)?;
            let o = pattern_term(&object, &prefixes)?;
            let g = graph_term(graph.as_deref(), &prefixes)?;
            for term in store.each(s.as_ref(), p.as_ref(), o.as_ref(), g.as_ref())? {
                writeln!(out, "{}", prefixes.display(&term))?;
            }
        }
        Commands::Query { query, json, order } => {
            let order = order.unwrap_or(config.pattern_order);
            let query = PatternQuery::parse(&query)?.with_order(order);
            let bindings = query.execute(&store);
            if json {
                let results = results_to_json(query.result_variables(), &bindings);
                writeln!(out, "{}", serde_json::to_string_pretty(&results)?)?;
            } else {
                let vars = query.result_variables();
                let header: Vec<String> = vars.iter().map(|v| format!("?{}", v.as_str())).collect();
                writeln!(out, "{}", header.join("\t"))?;
                for binding in &bindings {
                    let row: Vec<String> = vars
                        .iter()
                        .map(|v| {
                            binding
                                .get(v.as_str())
                                .map(|t| prefixes.display(t))
                                .unwrap_or_default()
                        })
                        .collect();
                    writeln!(out, "{}", row.join("\t"))?;
                }
                info!("{} results", bindings.len());
            }
        }
        Commands::Fetch { urls } => {
            let shared: SharedStore = store.into_shared();
            let fetcher = Fetcher::from_config(shared.clone(), &config)?;
            let rt = runtime()?;
            let outcomes = rt.block_on(async {
                let tasks: Vec<_> = urls.iter().map(|url| fetcher.load(url)).collect();
                let mut outcomes = Vec::with_capacity(tasks.len());
                for task in tasks {
                    outcomes.push(task.await);
                }
                outcomes
            });
            let mut failures = 0;
            for (url, outcome) in urls.iter().zip(outcomes) {
                match outcome {
                    Ok(loaded) => writeln!(out, "{url}\t{} quads", loaded.quads_added)?,
                    Err(e) => {
                        failures += 1;
                        writeln!(out, "{url}\tfailed: {e}")?;
                    }
                }
            }
            let total = shared.read().map_err(|_| anyhow!("store lock poisoned"))?.len();
            writeln!(out, "{total} quads")?;
            if failures > 0 {
                return Err(anyhow!("{} of {} fetches failed", failures, urls.len()));
            }
        }
        Commands::Diff { graph, file } => {
            let graph = named_graph(&graph, &prefixes)?;
            let diff = graph_diff(store, &graph, &file)?;
            if diff.is_empty() {
                info!("{} already matches {}", graph, file.display());
            } else {
                writeln!(out, "{}", diff.to_sparql_update_for(Some(&graph))?)?;
            }
        }
        Commands::Patch { graph, file } => {
            let graph = named_graph(&graph, &prefixes)?;
            let diff = graph_diff(store, &graph, &file)?;
            let updater = SyncUpdater::from_config(&config)?;
            let rt = runtime()?;
            rt.block_on(async { updater.spawn_apply(graph.clone(), diff.clone()).await })?;
            writeln!(
                out,
                "{}: {} deleted, {} inserted",
                graph,
                diff.to_delete.len(),
                diff.to_insert.len()
            )?;
        }
        Commands::Config { save } => match save {
            Some(path) => {
                config.save_to_file(&path)?;
                writeln!(out, "Wrote configuration to {}", path.display())?;
            }
            None => writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?,
        },
    }

    Ok(())
}
