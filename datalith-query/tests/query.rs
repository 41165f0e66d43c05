//! End-to-end query engine tests over a populated store.

use datalith_core::{kw, AttrSpec, Value, ValueType};
use datalith_kv::Env;
use datalith_query::{q, QueryInput, QueryResult};
use datalith_store::{DatomStore, StoreOptions};
use datalith_transact::{transact, EidRef, TxFnRegistry, TxItem};

fn add(e: u64, a: &str, v: impl Into<Value>) -> TxItem {
    TxItem::Add(EidRef::Eid(e), kw(a), v.into())
}

/// Six entities: Ivan/Oleg pairs over ages 10/20 (the or/or-join fixture).
fn people_store(dir: &tempfile::TempDir) -> DatomStore {
    let env = Env::open(dir.path()).unwrap();
    let store = DatomStore::open(
        env,
        StoreOptions::default(),
        vec![AttrSpec::new(kw(":friend")).value_type(ValueType::Ref).many()],
    )
    .unwrap();
    let fns = TxFnRegistry::new();
    transact(
        &store,
        &fns,
        vec![
            add(1, ":name", "Ivan"),
            add(1, ":age", 10i64),
            add(2, ":name", "Ivan"),
            add(2, ":age", 20i64),
            add(3, ":name", "Oleg"),
            add(3, ":age", 10i64),
            add(4, ":name", "Oleg"),
            add(4, ":age", 20i64),
            add(5, ":name", "Ivan"),
            add(5, ":age", 10i64),
            add(6, ":name", "Ivan"),
            add(6, ":age", 20i64),
        ],
    )
    .unwrap();
    store
}

fn eids(result: QueryResult) -> Vec<i64> {
    result
        .into_rows()
        .into_iter()
        .map(|row| row[0].as_long().unwrap())
        .collect()
}

#[test]
fn test_or_unions_branches() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let res = q(
        "[:find ?e :where (or [?e :name \"Oleg\"] [?e :age 10])]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(eids(res), vec![1, 3, 4, 5]);
}

#[test]
fn test_result_independent_of_clause_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let a = q(
        "[:find ?e :where [?e :name \"Ivan\"] [?e :age 10]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    let b = q(
        "[:find ?e :where [?e :age 10] [?e :name \"Ivan\"]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(a, b);
    assert_eq!(eids(a), vec![1, 5]);
}

#[test]
fn test_scalar_coll_tuple_finds() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);

    let scalar = q(
        "[:find ?a . :where [1 :age ?a]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(scalar, QueryResult::Scalar(Some(Value::Long(10))));

    let coll = q(
        "[:find [?a ...] :where [?e :age ?a]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(
        coll,
        QueryResult::Coll(vec![Value::Long(10), Value::Long(20)])
    );

    let tuple = q(
        "[:find [?e ?a] :where [?e :age ?a] [?e :name \"Oleg\"]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(
        tuple,
        QueryResult::Tuple(Some(vec![Value::Long(3), Value::Long(10)]))
    );
}

#[test]
fn test_scalar_input_and_predicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let res = q(
        "[:find ?e :in $ ?name :where [?e :name ?name] [?e :age ?a] [(< ?a 15)]]",
        vec![
            QueryInput::Source(store.reader()),
            QueryInput::Scalar("Ivan".into()),
        ],
    )
    .unwrap();
    assert_eq!(eids(res), vec![1, 5]);
}

#[test]
fn test_coll_and_rel_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let res = q(
        "[:find ?e :in $ [?name ...] :where [?e :name ?name] [?e :age 20]]",
        vec![
            QueryInput::Source(store.reader()),
            QueryInput::Coll(vec!["Ivan".into(), "Oleg".into()]),
        ],
    )
    .unwrap();
    assert_eq!(eids(res), vec![2, 4, 6]);

    let res = q(
        "[:find ?e ?x :in $ [[?name ?x]] :where [?e :name ?name] [?e :age 10]]",
        vec![
            QueryInput::Source(store.reader()),
            QueryInput::Rel(vec![
                vec!["Ivan".into(), Value::Long(100)],
                vec!["Oleg".into(), Value::Long(200)],
            ]),
        ],
    )
    .unwrap();
    let rows = res.into_rows();
    assert_eq!(rows.len(), 3);
    assert!(rows.contains(&vec![Value::Long(3), Value::Long(200)]));
}

#[test]
fn test_function_binding_and_untuple() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let res = q(
        "[:find ?e ?n :where [?e :age ?a] [?e :name \"Oleg\"] [(+ ?a 1) ?n]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    let rows = res.into_rows();
    assert!(rows.contains(&vec![Value::Long(3), Value::Long(11)]));
    assert!(rows.contains(&vec![Value::Long(4), Value::Long(21)]));

    // tuple then untuple round-trips through bindings
    let res = q(
        "[:find ?x ?y :in ?pair :where [(untuple ?pair) [?x ?y]]]",
        vec![QueryInput::Scalar(Value::Tuple(vec![
            Value::Long(1),
            Value::Long(2),
        ]))],
    )
    .unwrap();
    assert_eq!(
        res.into_rows(),
        vec![vec![Value::Long(1), Value::Long(2)]]
    );

    let res = q(
        "[:find ?t :in ?x ?y :where [(tuple ?x ?y) ?t]]",
        vec![
            QueryInput::Scalar(Value::Long(1)),
            QueryInput::Scalar(Value::Long(2)),
        ],
    )
    .unwrap();
    assert_eq!(
        res.into_rows(),
        vec![vec![Value::Tuple(vec![Value::Long(1), Value::Long(2)])]]
    );
}

#[test]
fn test_not_and_not_join() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let res = q(
        "[:find ?e :where [?e :age 10] (not [?e :name \"Ivan\"])]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(eids(res), vec![3]);

    let res = q(
        "[:find ?e :where [?e :age 10] (not-join [?e] [?e :name \"Oleg\"])]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(eids(res), vec![1, 5]);
}

#[test]
fn test_or_join_with_required_binding() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);

    let res = q(
        "[:find ?e :in $ ?n :where
           [?e :age 10]
           (or-join [[?n] ?e] [?e :name ?n] [?e :age ?n])]",
        vec![
            QueryInput::Source(store.reader()),
            QueryInput::Scalar("Oleg".into()),
        ],
    )
    .unwrap();
    assert_eq!(eids(res), vec![3]);

    // required binding missing entirely
    let err = q(
        "[:find ?e :where (or-join [[?n] ?e] [?e :name ?n])]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("Insufficient bindings"));
}

#[test]
fn test_multi_source_join() {
    let dir1 = tempfile::tempdir().unwrap();
    let store1 = people_store(&dir1);

    let dir2 = tempfile::tempdir().unwrap();
    let env2 = Env::open(dir2.path()).unwrap();
    let store2 = DatomStore::open(env2, StoreOptions::default(), vec![]).unwrap();
    let fns = TxFnRegistry::new();
    transact(
        &store2,
        &fns,
        vec![add(7, ":name", "Oleg"), add(7, ":city", "Riga")],
    )
    .unwrap();

    let res = q(
        "[:find ?n ?city :in $ $2 :where [?e :name ?n] [$2 ?e2 :name ?n] [$2 ?e2 :city ?city]]",
        vec![
            QueryInput::Source(store1.reader()),
            QueryInput::Source(store2.reader()),
        ],
    )
    .unwrap();
    assert_eq!(
        res.into_rows(),
        vec![vec!["Oleg".into(), "Riga".into()]]
    );

    // source scope changes the default for a block
    let res = q(
        "[:find ?city :in $ $2 :where ($2 [?e :city ?city])]",
        vec![
            QueryInput::Source(store1.reader()),
            QueryInput::Source(store2.reader()),
        ],
    )
    .unwrap();
    assert_eq!(res.into_rows(), vec![vec!["Riga".into()]]);
}

#[test]
fn test_recursive_rules() {
    let dir = tempfile::tempdir().unwrap();
    let env = Env::open(dir.path()).unwrap();
    let store = DatomStore::open(
        env,
        StoreOptions::default(),
        vec![AttrSpec::new(kw(":parent")).value_type(ValueType::Ref)],
    )
    .unwrap();
    let fns = TxFnRegistry::new();
    transact(
        &store,
        &fns,
        vec![
            TxItem::Add(EidRef::Eid(1), kw(":parent"), Value::Long(2)),
            TxItem::Add(EidRef::Eid(2), kw(":parent"), Value::Long(3)),
            TxItem::Add(EidRef::Eid(3), kw(":parent"), Value::Long(4)),
        ],
    )
    .unwrap();

    let res = q(
        "[:find ?a :in $ % :where (ancestor 1 ?a)]",
        vec![
            QueryInput::Source(store.reader()),
            QueryInput::Rules(
                "[[(ancestor ?x ?y) [?x :parent ?y]]
                  [(ancestor ?x ?y) [?x :parent ?t] (ancestor ?t ?y)]]"
                    .to_string(),
            ),
        ],
    )
    .unwrap();
    assert_eq!(eids(res), vec![2, 3, 4]);
}

#[test]
fn test_ref_navigation_and_reverse() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let fns = TxFnRegistry::new();
    transact(
        &store,
        &fns,
        vec![
            TxItem::Add(EidRef::Eid(1), kw(":friend"), Value::Long(3)),
            TxItem::Add(EidRef::Eid(2), kw(":friend"), Value::Long(3)),
        ],
    )
    .unwrap();

    // value position of a ref attr joins against entity position
    let res = q(
        "[:find ?e :where [?e :friend ?f] [?f :name \"Oleg\"]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(eids(res), vec![1, 2]);

    let res = q(
        "[:find ?e :where [?e :friend 3]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(eids(res), vec![1, 2]);
}

#[test]
fn test_keys_projection() {
    let dir = tempfile::tempdir().unwrap();
    let store = people_store(&dir);
    let res = q(
        "[:find ?e ?a :keys e age :where [?e :age ?a] [?e :name \"Oleg\"]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    let QueryResult::Maps(rows) = res else { panic!() };
    assert_eq!(rows.len(), 2);
    assert!(rows[0]
        .iter()
        .any(|(k, v)| k == ":age" && matches!(v, Value::Long(_))));
}

#[test]
fn test_lookup_ref_in_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let env = Env::open(dir.path()).unwrap();
    let store = DatomStore::open(
        env,
        StoreOptions::default(),
        vec![AttrSpec::new(kw(":email"))
            .value_type(ValueType::String)
            .unique_identity()],
    )
    .unwrap();
    let fns = TxFnRegistry::new();
    transact(
        &store,
        &fns,
        vec![add(1, ":email", "a@x"), add(1, ":name", "Ivan")],
    )
    .unwrap();

    let res = q(
        "[:find ?n . :where [[:email \"a@x\"] :name ?n]]",
        vec![QueryInput::Source(store.reader())],
    )
    .unwrap();
    assert_eq!(res, QueryResult::Scalar(Some("Ivan".into())));
}
