use tetrad::{PatternOrder, PatternQuery, QuadPattern, Store, Term, Variable};

const DATA: &[(&str, &str, &str)] = &[
    ("alice", "knows", "bob"),
    ("bob", "knows", "alice"),
    ("bob", "knows", "carol"),
    ("alice", "type", "Person"),
    ("bob", "type", "Person"),
    ("carol", "type", "Robot"),
];

fn ex(local: &str) -> Term {
    Term::iri(format!("http://example.org/{local}")).unwrap()
}

fn var(name: &str) -> Term {
    Term::variable(name).unwrap()
}

fn store() -> Store {
    let mut store = Store::new();
    for (s, p, o) in DATA {
        store.add(ex(s), ex(p), ex(o), None).unwrap();
    }
    store
        .add(ex("alice"), ex("age"), Term::literal("30"), Some(ex("profiles")))
        .unwrap();
    store
}

fn sorted_rows(query: &PatternQuery, store: &Store) -> Vec<Vec<Option<Term>>> {
    let mut rows: Vec<Vec<Option<Term>>> = query
        .execute(store)
        .iter()
        .map(|b| {
            query
                .result_variables()
                .iter()
                .map(|v| b.get(v.as_str()).cloned())
                .collect()
        })
        .collect();
    rows.sort_by_key(|row| format!("{row:?}"));
    rows
}

#[test]
fn join_on_shared_variable() {
    let query = PatternQuery::parse(
        "PREFIX ex: <http://example.org/>
         SELECT ?x ?y WHERE { ?x ex:knows ?y . ?y a ex:Person . ?x a ex:Person }",
    );
    // `a` is rdf:type, not ex:type
    let query = query.unwrap();
    assert!(query.execute(&store()).is_empty());

    let query = PatternQuery::parse(
        "PREFIX ex: <http://example.org/>
         SELECT ?x ?y WHERE { ?x ex:knows ?y . ?y ex:type ex:Person }",
    )
    .unwrap();
    let rows = sorted_rows(&query, &store());
    assert_eq!(
        rows,
        vec![
            vec![Some(ex("alice")), Some(ex("bob"))],
            vec![Some(ex("bob")), Some(ex("alice"))],
        ]
    );
}

#[test]
fn orders_give_same_results() {
    let text = "PREFIX ex: <http://example.org/>
        SELECT * WHERE { ?x ex:knows ?y . ?y ex:knows ?z . ?z ex:type ex:Robot }";
    let source = PatternQuery::parse(text).unwrap();
    let selective = PatternQuery::parse(text)
        .unwrap()
        .with_order(PatternOrder::Selectivity);
    let store = store();
    assert_eq!(sorted_rows(&source, &store), sorted_rows(&selective, &store));
    assert_eq!(source.execute(&store).len(), 1);
    assert_eq!(
        selective.execution_order()[0],
        &QuadPattern::new(var("z"), ex("type"), ex("Robot"))
    );
}

#[test]
fn graph_scoped_patterns() {
    let store = store();
    let scoped = PatternQuery::parse(
        "PREFIX ex: <http://example.org/> { GRAPH ex:profiles { ?who ex:age ?age } }",
    )
    .unwrap();
    let bindings = scoped.execute(&store);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].get("?who"), Some(&ex("alice")));

    let default_only = PatternQuery::parse(
        "PREFIX ex: <http://example.org/> { GRAPH DEFAULT { ?who ex:age ?age } }",
    )
    .unwrap();
    assert!(default_only.execute(&store).is_empty());

    let any_graph =
        PatternQuery::parse("PREFIX ex: <http://example.org/> { ?who ex:age ?age }").unwrap();
    assert_eq!(any_graph.execute(&store).len(), 1);

    let graph_var = PatternQuery::parse(
        "PREFIX ex: <http://example.org/> SELECT ?g { GRAPH ?g { ?who ex:age ?age } }",
    )
    .unwrap();
    assert_eq!(graph_var.execute(&store)[0].get("g"), Some(&ex("profiles")));
}

#[test]
fn repeated_variable_must_match_equal_terms() {
    let mut store = store();
    store.add(ex("narcissus"), ex("knows"), ex("narcissus"), None).unwrap();
    let query = PatternQuery::new(vec![QuadPattern::new(var("x"), ex("knows"), var("x"))]).unwrap();
    let bindings = query.execute(&store);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].get("x"), Some(&ex("narcissus")));
}

#[test]
fn projection_keeps_duplicates() {
    let query = PatternQuery::with_projection(
        vec![QuadPattern::new(var("x"), ex("knows"), var("y"))],
        vec![Variable::new("x").unwrap()],
    )
    .unwrap();
    let bindings = query.execute(&store());
    assert_eq!(bindings.len(), 3);
    assert!(bindings.iter().all(|b| b.len() == 1));
    assert_eq!(bindings.iter().filter(|b| b.get("x") == Some(&ex("bob"))).count(), 2);
}

#[test]
fn projection_of_unknown_variable_fails() {
    let err = PatternQuery::with_projection(
        vec![QuadPattern::new(var("x"), ex("knows"), var("y"))],
        vec![Variable::new("nobody").unwrap()],
    )
    .unwrap_err();
    assert!(err.message.contains("nobody") || err.token.contains("nobody"));
}

#[test]
fn query_is_reusable_across_stores() {
    let query = PatternQuery::parse("PREFIX ex: <http://example.org/> { ?s ex:knows ?o }").unwrap();
    assert!(query.ask(&store()));
    assert!(!query.ask(&Store::new()));
    assert_eq!(query.execute(&store()).len(), 3);
}

#[test]
fn results_serialize_as_sparql_json() {
    let query = PatternQuery::parse(
        "PREFIX ex: <http://example.org/> SELECT ?age { ?who ex:age ?age }",
    )
    .unwrap();
    let bindings = query.execute(&store());
    let json = tetrad::query::results_to_json(query.result_variables(), &bindings);
    assert_eq!(
        json,
        serde_json::json!({
            "head": { "vars": ["age"] },
            "results": { "bindings": [
                { "age": { "type": "literal", "value": "30" } }
            ] }
        })
    );
}
