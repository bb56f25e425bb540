use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tetrad::{Diff, Store, SyncUpdater, Term, UpdateError, UpdateTransport};

fn ex(local: &str) -> Term {
    Term::iri(format!("http://example.org/{local}")).unwrap()
}

/// Records every update it is handed, optionally failing or stalling.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(Term, String)>>,
    fail_with: Option<UpdateError>,
    delay: Option<Duration>,
}

#[async_trait]
impl UpdateTransport for RecordingTransport {
    async fn update(&self, target: &Term, diff: &Diff) -> Result<(), UpdateError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let body = diff.to_sparql_update_for(Some(target))?;
        self.sent.lock().unwrap().push((target.clone(), body));
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

fn seeded_store(graph: &Term) -> tetrad::SharedStore {
    let mut store = Store::new();
    store
        .add(ex("doc"), ex("title"), Term::literal("Draft"), Some(graph.clone()))
        .unwrap();
    store.into_shared()
}

#[tokio::test]
async fn edit_and_apply_sends_update() {
    let graph = ex("doc");
    let shared = seeded_store(&graph);
    let transport = Arc::new(RecordingTransport::default());
    let updater = SyncUpdater::new(transport.clone());

    let (_, diff) = SyncUpdater::edit(&shared, &graph, |store| {
        store
            .remove(ex("doc"), ex("title"), Term::literal("Draft"), Some(graph.clone()))
            .unwrap();
        store
            .add(ex("doc"), ex("title"), Term::literal("Final"), Some(graph.clone()))
            .unwrap();
    })
    .unwrap();
    updater.apply(&graph, &diff).await.unwrap();

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, graph);
    assert_eq!(
        sent[0].1,
        "DELETE DATA {\n  <http://example.org/doc> <http://example.org/title> \"Draft\" .\n} ;\n\
         INSERT DATA {\n  <http://example.org/doc> <http://example.org/title> \"Final\" .\n}"
    );
}

#[tokio::test]
async fn failed_update_keeps_local_edit() {
    let graph = ex("doc");
    let shared = seeded_store(&graph);
    let transport = Arc::new(RecordingTransport {
        fail_with: Some(UpdateError::Rejected {
            status: 409,
            message: "conflict".into(),
        }),
        ..Default::default()
    });
    let updater = SyncUpdater::new(transport);

    let (_, diff) = SyncUpdater::edit(&shared, &graph, |store| {
        store
            .add(ex("doc"), ex("author"), ex("alice"), Some(graph.clone()))
            .unwrap();
    })
    .unwrap();
    let err = updater.apply(&graph, &diff).await.unwrap_err();
    assert_eq!(
        err,
        UpdateError::Rejected {
            status: 409,
            message: "conflict".into()
        }
    );

    let store = shared.read().unwrap();
    assert!(store.holds(Some(&ex("doc")), Some(&ex("author")), Some(&ex("alice")), None));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn revert_is_left_to_the_caller() {
    let graph = ex("doc");
    let shared = seeded_store(&graph);
    let updater = SyncUpdater::new(Arc::new(RecordingTransport {
        fail_with: Some(UpdateError::Transport("connection reset".into())),
        ..Default::default()
    }));
    let (_, diff) = SyncUpdater::edit(&shared, &graph, |store| store.remove_graph(&graph)).unwrap();
    assert!(updater.apply(&graph, &diff).await.is_err());
    assert!(shared.read().unwrap().is_empty());

    diff.revert(&mut shared.write().unwrap());
    let store = shared.read().unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.holds(None, Some(&ex("title")), Some(&Term::literal("Draft")), None));
}

#[tokio::test]
async fn empty_diff_skips_transport() {
    let graph = ex("doc");
    let shared = seeded_store(&graph);
    let transport = Arc::new(RecordingTransport {
        fail_with: Some(UpdateError::Transport("should not be called".into())),
        ..Default::default()
    });
    let updater = SyncUpdater::new(transport.clone());
    let (count, diff) = SyncUpdater::edit(&shared, &graph, |store| store.len()).unwrap();
    assert_eq!(count, 1);
    assert!(diff.is_empty());
    updater.apply(&graph, &diff).await.unwrap();
    assert!(transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn edits_outside_the_graph_are_not_sent() {
    let graph = ex("doc");
    let shared = seeded_store(&graph);
    let (_, diff) = SyncUpdater::edit(&shared, &graph, |store| {
        store
            .add(ex("other"), ex("title"), Term::literal("x"), Some(ex("elsewhere")))
            .unwrap();
    })
    .unwrap();
    assert!(diff.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_apply_resolves_to_cancelled() {
    let graph = ex("doc");
    let transport = Arc::new(RecordingTransport {
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let updater = SyncUpdater::new(transport.clone());
    let diff = Diff {
        to_delete: Vec::new(),
        to_insert: vec![tetrad::Quad::triple(ex("a"), ex("p"), ex("b")).unwrap()],
    };
    let task = updater.spawn_apply(graph, diff);
    tokio::time::sleep(Duration::from_secs(1)).await;
    task.cancel();
    assert_eq!(task.await, Err(UpdateError::Cancelled));
    assert!(transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn spawned_apply_completes() {
    let transport = Arc::new(RecordingTransport::default());
    let updater = SyncUpdater::new(transport.clone());
    let diff = Diff {
        to_delete: vec![tetrad::Quad::triple(ex("a"), ex("p"), ex("b")).unwrap()],
        to_insert: Vec::new(),
    };
    updater.spawn_apply(ex("doc"), diff).join().await.unwrap();
    assert_eq!(transport.sent.lock().unwrap().len(), 1);
}
