//! Quantified invariants over the store after a mixed workload:
//! index mirroring, tuple attr consistency, db-wide uniqueness, and
//! report replayability.

use datalith::{
    kw, AttrSpec, Conn, ConnOptions, Datom, EidRef, Index, TxItem, Value, ValueType,
};
use datalith_store::Components;
use std::collections::HashSet;

fn add(e: u64, a: &str, v: impl Into<Value>) -> TxItem {
    TxItem::Add(EidRef::Eid(e), kw(a), v.into())
}

fn schema() -> Vec<AttrSpec> {
    vec![
        AttrSpec::new(kw(":friend")).value_type(ValueType::Ref).many(),
        AttrSpec::new(kw(":email"))
            .value_type(ValueType::String)
            .unique_identity(),
        AttrSpec::new(kw(":score")).value_type(ValueType::Long).index(),
        AttrSpec::new(kw(":a+b")).tuple_attrs(vec![kw(":a"), kw(":b")]),
    ]
}

fn workload(conn: &Conn) -> Vec<datalith::TxReport> {
    let mut reports = Vec::new();
    reports.push(
        conn.transact(vec![
            add(1, ":name", "Ivan"),
            add(1, ":email", "ivan@x"),
            add(1, ":score", 10i64),
            add(2, ":name", "Oleg"),
            TxItem::Add(EidRef::Eid(2), kw(":friend"), Value::Long(1)),
        ])
        .unwrap(),
    );
    reports.push(conn.transact(vec![add(1, ":a", "a")]).unwrap());
    reports.push(conn.transact(vec![add(1, ":b", "b")]).unwrap());
    reports.push(
        conn.transact(vec![
            TxItem::Retract(EidRef::Eid(1), kw(":a"), "a".into()),
            add(2, ":score", 20i64),
        ])
        .unwrap(),
    );
    reports.push(
        conn.transact(vec![TxItem::Cas(
            EidRef::Eid(1),
            kw(":score"),
            Some(Value::Long(10)),
            Value::Long(11),
        )])
        .unwrap(),
    );
    reports
}

fn all_datoms(db: &datalith::StoreReader, index: Index) -> Vec<Datom> {
    db.datoms(index, Components::all())
        .collect::<datalith_store::Result<_>>()
        .unwrap()
}

/// Property 1: EAVT == AEVT; AVET iff indexed/unique/ref; VAET iff ref.
#[test]
fn test_index_mirroring() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Conn::open(dir.path(), ConnOptions::new().schema(schema())).unwrap();
    workload(&conn);

    let db = conn.db();
    let eavt: HashSet<Datom> = all_datoms(&db, Index::Eavt).into_iter().collect();
    let aevt: HashSet<Datom> = all_datoms(&db, Index::Aevt).into_iter().collect();
    assert_eq!(eavt, aevt);
    assert!(!eavt.is_empty());

    let avet: HashSet<Datom> = all_datoms(&db, Index::Avet).into_iter().collect();
    let vaet: HashSet<Datom> = all_datoms(&db, Index::Vaet).into_iter().collect();
    for d in &eavt {
        let spec = db.schema().attr(&d.a).unwrap();
        assert_eq!(
            avet.contains(d),
            spec.index || spec.is_unique() || spec.is_ref(),
            "AVET membership for {d}"
        );
        assert_eq!(vaet.contains(d), spec.is_ref(), "VAET membership for {d}");
    }
    for d in &avet {
        assert!(eavt.contains(d));
    }
    for d in &vaet {
        assert!(eavt.contains(d));
    }
}

/// Property 2: the composite tuple exists iff at least one source is
/// present, with nil in absent positions.
#[test]
fn test_tuple_attr_consistency() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Conn::open(dir.path(), ConnOptions::new().schema(schema())).unwrap();
    workload(&conn);

    let db = conn.db();
    assert_eq!(
        db.value(1, &kw(":a+b")).unwrap(),
        Some(Value::Tuple(vec![Value::Nil, "b".into()]))
    );

    conn.transact(vec![TxItem::Retract(EidRef::Eid(1), kw(":b"), "b".into())])
        .unwrap();
    assert_eq!(conn.db().value(1, &kw(":a+b")).unwrap(), None);
}

/// Property 3: no two entities share a value of a unique attribute.
#[test]
fn test_unique_attrs_db_wide() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Conn::open(dir.path(), ConnOptions::new().schema(schema())).unwrap();
    workload(&conn);

    let db = conn.db();
    let mut seen: HashSet<(datalith::Keyword, Value)> = HashSet::new();
    for d in all_datoms(&db, Index::Eavt) {
        if db.rschema().is_unique(&d.a) {
            assert!(
                seen.insert((d.a.clone(), d.v.clone())),
                "duplicate unique value {d}"
            );
        }
    }

    let err = conn.transact(vec![add(2, ":email", "ivan@x")]).unwrap_err();
    assert!(err.to_string().starts_with("Cannot add"));
}

/// Property 4: applying each report's tx-data to a replica that was at
/// db-before yields db-after.
#[test]
fn test_report_replay() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Conn::open(dir.path(), ConnOptions::new().schema(schema())).unwrap();

    let replica_dir = tempfile::tempdir().unwrap();
    let replica_env = datalith_kv::Env::open(replica_dir.path()).unwrap();
    let replica = datalith_store::DatomStore::open(
        replica_env,
        datalith_store::StoreOptions::default(),
        schema(),
    )
    .unwrap();

    for report in workload(&conn) {
        let idents: Vec<datalith::Keyword> =
            report.tx_data.iter().map(|d| d.a.clone()).collect();
        replica.intern_idents(&idents).unwrap();
        replica
            .apply(&report.tx_data, report.db_after.max_eid, report.db_after.max_tx)
            .unwrap();
    }

    let primary: HashSet<Datom> = all_datoms(&conn.db(), Index::Eavt).into_iter().collect();
    let mirrored: HashSet<Datom> = replica
        .reader()
        .datoms(Index::Eavt, Components::all())
        .collect::<datalith_store::Result<_>>()
        .unwrap();
    assert_eq!(primary, mirrored);
    assert_eq!(replica.max_tx(), conn.db().basis_tx());
}
