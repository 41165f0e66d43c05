//! Query evaluation
//!
//! Threads a [`Relation`] through the planned clause sequence. Patterns pick
//! the best index, scan the store, and join; `or`/`or-join` evaluate each
//! branch from the parent relation projected to the exported variables and
//! union; `not`/`not-join` antijoin; functions bind new columns; rules are
//! solved bottom-up to a fixpoint and joined at the call site.
//!
//! Entity ids and ref values normalize to `Long` inside relations, so joins
//! between entity positions and ref-valued objects unify.

use crate::builtins;
use crate::error::{Error, Result};
use crate::parse::{
    parse_rules, Clause, FindSpec, FnBinding, InBinding, KeyStyle, Pattern, Query, Rule, Term, Var,
};
use crate::plan::plan;
use crate::relation::Relation;
use datalith_core::{Eid, Index, Value};
use datalith_store::{Components, StoreReader};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;

/// One query input, positionally matched against `:in`.
pub enum QueryInput {
    /// A database view for a `$...` source
    Source(StoreReader),
    /// A scalar for `?x`
    Scalar(Value),
    /// One tuple for `[?x ?y]`
    Tuple(Vec<Value>),
    /// A collection for `[?x ...]`
    Coll(Vec<Value>),
    /// A relation for `[[?x ?y]]`
    Rel(Vec<Vec<Value>>),
    /// EDN rules text for `%`
    Rules(String),
}

/// Query result, shaped by the `:find` spec.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    /// Set of tuples, sorted for determinism
    Rel(Vec<Vec<Value>>),
    /// First column as a collection
    Coll(Vec<Value>),
    /// A single tuple (or None when empty)
    Tuple(Option<Vec<Value>>),
    /// A single scalar (or None when empty)
    Scalar(Option<Value>),
    /// Rows as key/value maps (`:keys` / `:strs` / `:syms`)
    Maps(Vec<Vec<(String, Value)>>),
}

impl QueryResult {
    /// Rows regardless of shape; scalars/tuples become 0-or-1 rows.
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        match self {
            QueryResult::Rel(rows) => rows,
            QueryResult::Coll(vals) => vals.into_iter().map(|v| vec![v]).collect(),
            QueryResult::Tuple(row) => row.into_iter().collect(),
            QueryResult::Scalar(v) => v.into_iter().map(|v| vec![v]).collect(),
            QueryResult::Maps(rows) => rows
                .into_iter()
                .map(|r| r.into_iter().map(|(_, v)| v).collect())
                .collect(),
        }
    }
}

#[derive(Clone)]
struct Ctx<'a> {
    sources: &'a FxHashMap<String, StoreReader>,
    rules: &'a FxHashMap<String, Rule>,
    default_src: String,
    /// During rule fixpoint iteration: the current derived extensions
    fixpoint: Option<&'a FxHashMap<String, Relation>>,
    /// Solved rule extensions, keyed by default source
    cache: &'a RefCell<FxHashMap<String, FxHashMap<String, Relation>>>,
}

impl<'a> Ctx<'a> {
    fn with_src(&self, src: &str) -> Ctx<'a> {
        let mut c = self.clone();
        c.default_src = src.to_string();
        c
    }

    fn source(&self, name: &str) -> Result<&'a StoreReader> {
        self.sources
            .get(name)
            .ok_or_else(|| Error::UnknownSource(name.to_string()))
    }
}

/// Parse and evaluate a query against positional inputs.
pub fn q(query_text: &str, inputs: Vec<QueryInput>) -> Result<QueryResult> {
    let query = crate::parse::parse_query(query_text)?;
    eval_query(&query, inputs)
}

/// Evaluate a parsed query.
pub fn eval_query(query: &Query, inputs: Vec<QueryInput>) -> Result<QueryResult> {
    let span = tracing::debug_span!("query", clauses = query.where_.len());
    let _guard = span.enter();

    if query.inputs.len() != inputs.len() {
        return Err(Error::InputArity {
            expected: query.inputs.len(),
            got: inputs.len(),
        });
    }

    let mut sources: FxHashMap<String, StoreReader> = FxHashMap::default();
    let mut rules: FxHashMap<String, Rule> = FxHashMap::default();
    let mut init = Relation::unit();

    for (binding, input) in query.inputs.iter().zip(inputs) {
        match (binding, input) {
            (InBinding::Source(name), QueryInput::Source(reader)) => {
                sources.insert(name.clone(), reader);
            }
            (InBinding::Rules, QueryInput::Rules(text)) => {
                for rule in parse_rules(&text)? {
                    rules.insert(rule.name.clone(), rule);
                }
            }
            (InBinding::Scalar(var), QueryInput::Scalar(v)) => {
                init = init.join(Relation::new(vec![var.clone()], vec![vec![v]]));
            }
            (InBinding::Tuple(vars), QueryInput::Tuple(vals)) => {
                if vars.len() != vals.len() {
                    return Err(Error::MalformedQuery(format!(
                        "tuple input arity: expected {}, got {}",
                        vars.len(),
                        vals.len()
                    )));
                }
                init = init.join(Relation::new(vars.clone(), vec![vals]));
            }
            (InBinding::Coll(var), QueryInput::Coll(vals)) => {
                let rows = vals.into_iter().map(|v| vec![v]).collect();
                init = init.join(Relation::new(vec![var.clone()], rows));
            }
            (InBinding::Rel(vars), QueryInput::Rel(rows)) => {
                init = init.join(Relation::new(vars.clone(), rows));
            }
            (binding, _) => {
                return Err(Error::MalformedQuery(format!(
                    "input does not match :in binding {binding:?}"
                )));
            }
        }
    }

    let cache = RefCell::new(FxHashMap::default());
    let ctx = Ctx {
        sources: &sources,
        rules: &rules,
        default_src: "$".to_string(),
        fixpoint: None,
        cache: &cache,
    };

    let rel = eval_clauses(init, &query.where_, &ctx)?;
    project(query, rel)
}

fn eval_clauses(rel: Relation, clauses: &[Clause], ctx: &Ctx<'_>) -> Result<Relation> {
    let bound: FxHashSet<Var> = rel.header.iter().cloned().collect();
    let ordered = plan(clauses, &bound);
    let mut rel = rel;
    for clause in &ordered {
        rel = eval_clause(rel, clause, ctx)?;
    }
    Ok(rel)
}

fn eval_clause(rel: Relation, clause: &Clause, ctx: &Ctx<'_>) -> Result<Relation> {
    match clause {
        Clause::Pattern(p) => eval_pattern(rel, p, ctx),
        Clause::Pred { op, args } => eval_pred(rel, op, args),
        Clause::Fn { op, args, binding } => eval_fn(rel, op, args, binding),
        Clause::Not { src, vars, clauses } => eval_not(rel, src.as_deref(), vars, clauses, ctx),
        Clause::Or {
            src,
            join,
            branches,
        } => eval_or(rel, src.as_deref(), join.as_ref(), branches, ctx),
        Clause::RuleCall { name, args } => eval_rule_call(rel, name, args, ctx),
        Clause::SourceScope { src, clauses } => eval_clauses(rel, clauses, &ctx.with_src(src)),
    }
}

/// Refs normalize to longs inside relations so entity and value positions
/// unify under joins.
fn normalize(v: Value) -> Value {
    match v {
        Value::Ref(e) => Value::Long(e as i64),
        other => other,
    }
}

/// Resolve a constant in entity position; `Ok(None)` means provably no match
/// (negative id, unresolved lookup ref).
fn entity_const(v: &Value, reader: &StoreReader) -> Result<Option<Eid>> {
    match v {
        Value::Long(n) if *n >= 0 => Ok(Some(*n as Eid)),
        Value::Long(_) => Ok(None),
        Value::Ref(e) => Ok(Some(*e)),
        Value::Tuple(t) if t.len() == 2 => match &t[0] {
            Value::Keyword(a) => Ok(reader.eid_by_av(a, &t[1])?),
            _ => Err(Error::MalformedClause(format!("bad entity constant {v}"))),
        },
        other => Err(Error::MalformedClause(format!(
            "bad entity constant {other}"
        ))),
    }
}

fn eval_pattern(rel: Relation, p: &Pattern, ctx: &Ctx<'_>) -> Result<Relation> {
    let src = p.src.as_deref().unwrap_or(&ctx.default_src);
    let reader = ctx.source(src)?;

    // slot layout: (index into datom, variable) with duplicate-var checks
    #[derive(Clone, Copy, PartialEq)]
    enum Slot {
        E,
        A,
        V,
        Tx,
    }
    let slots = [
        (Slot::E, &p.e),
        (Slot::A, &p.a),
        (Slot::V, &p.v),
        (Slot::Tx, &p.tx),
    ];

    let mut comps = Components::default();
    let mut tx_filter: Option<u64> = None;
    let mut provably_empty = false;

    if let Term::Const(v) = &p.e {
        match entity_const(v, reader)? {
            Some(e) => comps.e = Some(e),
            None => provably_empty = true,
        }
    }
    if let Term::Const(v) = &p.a {
        match v {
            Value::Keyword(k) => comps.a = Some(k.clone()),
            other => {
                return Err(Error::MalformedClause(format!(
                    "attribute must be a keyword, got {other}"
                )))
            }
        }
    }
    if let Term::Const(v) = &p.v {
        let v = match (&comps.a, v) {
            // a known ref attribute compares by entity: longs and lookup
            // refs coerce to Ref
            (Some(a), other) if reader.rschema().is_ref(a) => match entity_const(other, reader)? {
                Some(e) => Value::Ref(e),
                None => {
                    provably_empty = true;
                    Value::Nil
                }
            },
            (_, other) => other.clone(),
        };
        comps.v = Some(v);
    }
    if let Term::Const(v) = &p.tx {
        match v.as_long() {
            Some(t) if t >= 0 => tx_filter = Some(t as u64),
            _ => provably_empty = true,
        }
    }

    // header for the scan relation, with duplicate-var equality slots
    let mut header: Vec<Var> = Vec::new();
    let mut out_slots: Vec<(Slot, usize)> = Vec::new(); // slot -> column
    let mut eq_slots: Vec<(Slot, usize)> = Vec::new(); // slot must equal column
    for (slot, term) in slots {
        if let Term::Var(v) = term {
            match header.iter().position(|h| h == v) {
                Some(i) => eq_slots.push((slot, i)),
                None => {
                    header.push(v.clone());
                    out_slots.push((slot, header.len() - 1));
                }
            }
        }
    }

    let mut tuples: Vec<Vec<Value>> = Vec::new();
    if !provably_empty {
        let a_in_ave = comps
            .a
            .as_ref()
            .is_some_and(|a| reader.rschema().in_ave(a));
        let v_is_ref = matches!(comps.v, Some(Value::Ref(_)));
        let index = Index::for_components(
            comps.e.is_some(),
            comps.a.is_some(),
            comps.v.is_some(),
            v_is_ref,
            a_in_ave,
        );
        for datom in reader.datoms(index, comps.clone()) {
            let d = datom?;
            if let Some(t) = tx_filter {
                if d.tx != t {
                    continue;
                }
            }
            let slot_val = |slot: Slot| -> Value {
                match slot {
                    Slot::E => Value::Long(d.e as i64),
                    Slot::A => Value::Keyword(d.a.clone()),
                    Slot::V => normalize(d.v.clone()),
                    Slot::Tx => Value::Long(d.tx as i64),
                }
            };
            let mut row: Vec<Value> = vec![Value::Nil; header.len()];
            for &(slot, col) in &out_slots {
                row[col] = slot_val(slot);
            }
            let consistent = eq_slots
                .iter()
                .all(|&(slot, col)| slot_val(slot) == row[col]);
            if consistent {
                tuples.push(row);
            }
        }
    }

    Ok(rel.join(Relation::new(header, tuples)))
}

/// Evaluate argument terms against a row.
fn eval_args(
    op: &str,
    args: &[Term],
    header: &[Var],
    row: &[Value],
) -> Result<Vec<Value>> {
    args.iter()
        .map(|t| match t {
            Term::Const(v) => Ok(v.clone()),
            Term::Var(v) => header
                .iter()
                .position(|h| h == v)
                .map(|i| row[i].clone())
                .ok_or_else(|| Error::InsufficientBindings(v.clone())),
            Term::Blank => Err(Error::MalformedClause(format!("_ argument to {op}"))),
        })
        .collect()
}

fn eval_pred(mut rel: Relation, op: &str, args: &[Term]) -> Result<Relation> {
    let header = rel.header.clone();
    let mut failed: Option<Error> = None;
    rel.tuples.retain(|row| {
        if failed.is_some() {
            return false;
        }
        match eval_args(op, args, &header, row).and_then(|vals| builtins::call_pred(op, &vals)) {
            Ok(keep) => keep,
            Err(e) => {
                failed = Some(e);
                false
            }
        }
    });
    match failed {
        Some(e) => Err(e),
        None => Ok(rel),
    }
}

fn eval_fn(rel: Relation, op: &str, args: &[Term], binding: &FnBinding) -> Result<Relation> {
    let in_header = rel.header.clone();
    let bind_vars = binding.vars();

    // output header: existing columns plus the newly bound variables
    let mut header = in_header.clone();
    for v in &bind_vars {
        if !header.contains(v) {
            header.push(v.clone());
        }
    }

    let mut tuples: Vec<Vec<Value>> = Vec::new();
    for row in &rel.tuples {
        let vals = eval_args(op, args, &in_header, row)?;
        let result = builtins::call_fn(op, &vals)?;

        // each produced binding set extends the row (colls/rels fan out)
        let bind_sets: Vec<Vec<Value>> = match binding {
            FnBinding::Scalar(_) => vec![vec![result]],
            FnBinding::Tuple(vars) => match result {
                Value::Tuple(items) if items.len() == vars.len() => vec![items],
                other => {
                    return Err(Error::BadApply {
                        op: op.to_string(),
                        args: format!("{other} does not destructure to {} vars", vars.len()),
                    })
                }
            },
            FnBinding::Coll(_) => match result {
                Value::Tuple(items) => items.into_iter().map(|v| vec![v]).collect(),
                other => {
                    return Err(Error::BadApply {
                        op: op.to_string(),
                        args: format!("{other} is not a collection"),
                    })
                }
            },
            FnBinding::Rel(vars) => match result {
                Value::Tuple(rows) => {
                    let mut sets = Vec::new();
                    for r in rows {
                        match r {
                            Value::Tuple(items) if items.len() == vars.len() => sets.push(items),
                            other => {
                                return Err(Error::BadApply {
                                    op: op.to_string(),
                                    args: format!("relation row {other}"),
                                })
                            }
                        }
                    }
                    sets
                }
                other => {
                    return Err(Error::BadApply {
                        op: op.to_string(),
                        args: format!("{other} is not a relation"),
                    })
                }
            },
        };

        'sets: for set in bind_sets {
            let mut out = row.clone();
            out.resize(header.len(), Value::Nil);
            for (var, val) in bind_vars.iter().zip(set) {
                let val = normalize(val);
                let col = header.iter().position(|h| h == var).unwrap();
                if col < in_header.len() {
                    // already-bound variable: equality filter
                    if out[col] != val {
                        continue 'sets;
                    }
                } else {
                    out[col] = val;
                }
            }
            tuples.push(out);
        }
    }
    Ok(Relation::new(header, tuples))
}

fn eval_not(
    rel: Relation,
    src: Option<&str>,
    vars: &[Var],
    clauses: &[Clause],
    ctx: &Ctx<'_>,
) -> Result<Relation> {
    let ctx = match src {
        Some(s) => ctx.with_src(s),
        None => ctx.clone(),
    };
    let key_vars: Vec<Var> = if vars.is_empty() {
        let mut inner = FxHashSet::default();
        for c in clauses {
            crate::parse::clause_vars(c, &mut inner);
        }
        rel.header
            .iter()
            .filter(|h| inner.contains(*h))
            .cloned()
            .collect()
    } else {
        for v in vars {
            if rel.col(v).is_none() {
                return Err(Error::InsufficientBindings(v.clone()));
            }
        }
        vars.to_vec()
    };

    let base = rel.project(&key_vars)?;
    let matched = eval_clauses(base, clauses, &ctx)?;
    let matched_keys = matched.project(&key_vars)?;
    Ok(rel.antijoin(&matched_keys))
}

fn eval_or(
    rel: Relation,
    src: Option<&str>,
    join: Option<&crate::parse::OrJoinSpec>,
    branches: &[Vec<Clause>],
    ctx: &Ctx<'_>,
) -> Result<Relation> {
    let ctx = match src {
        Some(s) => ctx.with_src(s),
        None => ctx.clone(),
    };

    let exported: Vec<Var> = match join {
        Some(spec) => {
            let missing: Vec<&Var> = spec
                .required
                .iter()
                .filter(|v| rel.col(v).is_none())
                .collect();
            if !missing.is_empty() {
                return Err(Error::InsufficientBindings(
                    missing
                        .iter()
                        .map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ));
            }
            spec.required
                .iter()
                .chain(spec.free.iter())
                .cloned()
                .collect()
        }
        None => {
            // all branches share the same free vars (checked at parse)
            let mut vars = FxHashSet::default();
            if let Some(branch) = branches.first() {
                for c in branch {
                    crate::parse::clause_vars(c, &mut vars);
                }
            }
            let mut vars: Vec<Var> = vars.into_iter().collect();
            vars.sort();
            vars
        }
    };

    let base_vars: Vec<Var> = exported
        .iter()
        .filter(|v| rel.col(v).is_some())
        .cloned()
        .collect();
    let base = rel.project(&base_vars)?;

    let mut acc: Option<Relation> = None;
    for branch in branches {
        let r = eval_clauses(base.clone(), branch, &ctx)?;
        let r = r.project(&exported)?;
        acc = Some(match acc {
            None => r,
            Some(a) => a.union(r)?,
        });
    }
    let unioned = acc.unwrap_or_else(|| Relation::empty(exported));
    Ok(rel.join(unioned))
}

fn eval_rule_call(rel: Relation, name: &str, args: &[Term], ctx: &Ctx<'_>) -> Result<Relation> {
    let rule = ctx
        .rules
        .get(name)
        .ok_or_else(|| Error::UnknownRule(name.to_string()))?;
    let head = rule.head_vars();
    if head.len() != args.len() {
        return Err(Error::MalformedClause(format!(
            "rule {name} expects {} args, got {}",
            head.len(),
            args.len()
        )));
    }
    // required head vars must be bound at the call site
    for (i, hv) in head.iter().enumerate() {
        if rule.required.contains(hv) {
            match &args[i] {
                Term::Const(_) => {}
                Term::Var(v) if rel.col(v).is_some() => {}
                Term::Var(v) => return Err(Error::InsufficientBindings(v.clone())),
                Term::Blank => return Err(Error::InsufficientBindings(hv.clone())),
            }
        }
    }

    let extension = match ctx.fixpoint {
        Some(derived) => derived
            .get(name)
            .cloned()
            .unwrap_or_else(|| Relation::empty(head.clone())),
        None => {
            solve_rules(ctx)?;
            ctx.cache
                .borrow()
                .get(&ctx.default_src)
                .and_then(|m| m.get(name))
                .cloned()
                .unwrap_or_else(|| Relation::empty(head.clone()))
        }
    };

    // rewrite the extension's head columns to the call-site terms
    enum Move {
        MustEqual(Value),
        Into(usize),
    }
    let mut out_header: Vec<Var> = Vec::new();
    let mut moves: Vec<(usize, Move)> = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Term::Const(c) => moves.push((i, Move::MustEqual(c.clone()))),
            Term::Blank => {}
            Term::Var(v) => match out_header.iter().position(|h| h == v) {
                Some(col) => moves.push((i, Move::Into(col))),
                None => {
                    out_header.push(v.clone());
                    moves.push((i, Move::Into(out_header.len() - 1)));
                }
            },
        }
    }
    let mut tuples = Vec::new();
    'rows: for row in &extension.tuples {
        let mut out = vec![Value::Nil; out_header.len()];
        let mut seen = vec![false; out_header.len()];
        for (i, mv) in &moves {
            match mv {
                Move::MustEqual(c) => {
                    if &row[*i] != c {
                        continue 'rows;
                    }
                }
                Move::Into(col) => {
                    if seen[*col] && out[*col] != row[*i] {
                        continue 'rows;
                    }
                    out[*col] = row[*i].clone();
                    seen[*col] = true;
                }
            }
        }
        tuples.push(out);
    }
    let mut call_rel = Relation::new(out_header, tuples);
    call_rel.dedup();
    Ok(rel.join(call_rel))
}

/// Solve all rule extensions for the context's default source by naive
/// bottom-up fixpoint iteration. Recursive rules converge because the datom
/// universe is finite and derivation is monotone.
fn solve_rules(ctx: &Ctx<'_>) -> Result<()> {
    if ctx.cache.borrow().contains_key(&ctx.default_src) {
        return Ok(());
    }
    let mut derived: FxHashMap<String, Relation> = ctx
        .rules
        .values()
        .map(|r| (r.name.clone(), Relation::empty(r.head_vars())))
        .collect();
    let mut seen: FxHashMap<String, FxHashSet<Vec<Value>>> = ctx
        .rules
        .keys()
        .map(|n| (n.clone(), FxHashSet::default()))
        .collect();

    loop {
        let mut changed = false;
        for rule in ctx.rules.values() {
            for branch in &rule.branches {
                let inner = Ctx {
                    sources: ctx.sources,
                    rules: ctx.rules,
                    default_src: ctx.default_src.clone(),
                    fixpoint: Some(&derived),
                    cache: ctx.cache,
                };
                let r = eval_clauses(Relation::unit(), branch, &inner)?;
                let r = r.project(&rule.head_vars())?;
                let new_rows: Vec<Vec<Value>> = r
                    .tuples
                    .into_iter()
                    .filter(|row| !seen[&rule.name].contains(row))
                    .collect();
                if !new_rows.is_empty() {
                    changed = true;
                    let set = seen.get_mut(&rule.name).unwrap();
                    let rel = derived.get_mut(&rule.name).unwrap();
                    for row in new_rows {
                        set.insert(row.clone());
                        rel.tuples.push(row);
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    ctx.cache
        .borrow_mut()
        .insert(ctx.default_src.clone(), derived);
    Ok(())
}

/// Shape the final relation per the `:find` spec (and `:with` / `:keys`).
fn project(query: &Query, rel: Relation) -> Result<QueryResult> {
    let find_vars = query.find.vars();
    let mut all = find_vars.clone();
    for w in &query.with {
        if !all.contains(w) {
            all.push(w.clone());
        }
    }
    let widened = rel.project(&all)?;
    let narrowed = widened.project(&find_vars)?;
    let mut rows = narrowed.tuples;
    rows.sort();

    if let Some((style, names)) = &query.keys {
        let keyed = rows
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row)
                    .map(|(n, v)| {
                        let key = match style {
                            KeyStyle::Keys => format!(":{n}"),
                            KeyStyle::Strs | KeyStyle::Syms => n.clone(),
                        };
                        (key, v)
                    })
                    .collect()
            })
            .collect();
        return Ok(QueryResult::Maps(keyed));
    }

    Ok(match &query.find {
        FindSpec::Rel(_) => QueryResult::Rel(rows),
        FindSpec::Coll(_) => {
            QueryResult::Coll(rows.into_iter().map(|mut r| r.remove(0)).collect())
        }
        FindSpec::Tuple(_) => QueryResult::Tuple(rows.into_iter().next()),
        FindSpec::Scalar(_) => {
            QueryResult::Scalar(rows.into_iter().next().map(|mut r| r.remove(0)))
        }
    })
}
