//! Query and rules parsing
//!
//! Shapes EDN forms into the query AST. Clauses are tagged variants
//! (`Pattern`, `Pred`, `Fn`, `Not`, `Or`, `RuleCall`, `SourceScope`); the
//! `or` free-variable invariant is enforced here, at parse time.

use crate::edn::{read_edn, Edn};
use crate::error::{Error, Result};
use datalith_core::{Keyword, Value};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;

/// Query variable, including the leading `?`.
pub type Var = String;

/// How `:keys` / `:strs` / `:syms` shape row maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStyle {
    Keys,
    Strs,
    Syms,
}

/// The `:find` projection shape.
#[derive(Clone, Debug, PartialEq)]
pub enum FindSpec {
    /// `?a ?b` - set of tuples
    Rel(Vec<Var>),
    /// `[?a ...]` - first column as a collection
    Coll(Var),
    /// `[?a ?b]` - a single tuple
    Tuple(Vec<Var>),
    /// `?a .` - a single scalar
    Scalar(Var),
}

impl FindSpec {
    pub fn vars(&self) -> Vec<Var> {
        match self {
            FindSpec::Rel(vs) | FindSpec::Tuple(vs) => vs.clone(),
            FindSpec::Coll(v) | FindSpec::Scalar(v) => vec![v.clone()],
        }
    }
}

/// One `:in` binding.
#[derive(Clone, Debug, PartialEq)]
pub enum InBinding {
    /// `$`, `$2`, ... - a database source
    Source(String),
    /// `%` - the rules set
    Rules,
    /// `?x` - a scalar
    Scalar(Var),
    /// `[?x ?y]` - one tuple
    Tuple(Vec<Var>),
    /// `[?x ...]` - a collection
    Coll(Var),
    /// `[[?x ?y]]` - a relation
    Rel(Vec<Var>),
}

/// Pattern component: variable, constant, or wildcard.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Var(Var),
    Const(Value),
    Blank,
}

impl Term {
    pub fn var(&self) -> Option<&Var> {
        match self {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }
}

/// A data pattern `[src? e a v tx?]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    pub src: Option<String>,
    pub e: Term,
    pub a: Term,
    pub v: Term,
    pub tx: Term,
}

/// Output binding of a function clause.
#[derive(Clone, Debug, PartialEq)]
pub enum FnBinding {
    Scalar(Var),
    Tuple(Vec<Var>),
    Coll(Var),
    Rel(Vec<Var>),
}

impl FnBinding {
    pub fn vars(&self) -> Vec<Var> {
        match self {
            FnBinding::Scalar(v) | FnBinding::Coll(v) => vec![v.clone()],
            FnBinding::Tuple(vs) | FnBinding::Rel(vs) => vs.clone(),
        }
    }
}

/// Exported/required variables of an `or-join`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrJoinSpec {
    /// `[?x]` entries: must already be bound by the surrounding query
    pub required: Vec<Var>,
    /// bare entries: exported free variables
    pub free: Vec<Var>,
}

/// One `:where` clause.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Pattern(Pattern),
    /// `[(pred args...)]`
    Pred { op: String, args: Vec<Term> },
    /// `[(f args...) binding]`
    Fn {
        op: String,
        args: Vec<Term>,
        binding: FnBinding,
    },
    /// `(not ...)` / `(not-join [vars] ...)`; empty `vars` means plain not
    Not {
        src: Option<String>,
        vars: Vec<Var>,
        clauses: Vec<Clause>,
    },
    /// `(or ...)` / `(or-join [spec] ...)`
    Or {
        src: Option<String>,
        join: Option<OrJoinSpec>,
        branches: Vec<Vec<Clause>>,
    },
    /// `(rule-name args...)`
    RuleCall { name: String, args: Vec<Term> },
    /// `($src clause+)` - rebind the default source for the nested block
    SourceScope { src: String, clauses: Vec<Clause> },
}

/// One rule with merged branches.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub name: String,
    /// `[?x]`-style head vars: must be bound at the call site
    pub required: Vec<Var>,
    pub free: Vec<Var>,
    pub branches: Vec<Vec<Clause>>,
}

impl Rule {
    pub fn head_vars(&self) -> Vec<Var> {
        let mut vs = self.required.clone();
        vs.extend(self.free.iter().cloned());
        vs
    }
}

/// A parsed query.
#[derive(Clone, Debug)]
pub struct Query {
    pub find: FindSpec,
    pub with: Vec<Var>,
    pub inputs: Vec<InBinding>,
    pub where_: Vec<Clause>,
    pub keys: Option<(KeyStyle, Vec<String>)>,
}

/// Parse a query from EDN text (vector or map form).
pub fn parse_query(text: &str) -> Result<Query> {
    shape_query(&read_edn(text)?)
}

/// Parse a rules set from EDN text: `[[(head args) clause+] ...]`.
pub fn parse_rules(text: &str) -> Result<Vec<Rule>> {
    let edn = read_edn(text)?;
    let Some(defs) = edn.items() else {
        return Err(Error::MalformedQuery("rules must be a vector".into()));
    };
    let mut rules: Vec<Rule> = Vec::new();
    for def in defs {
        let Some(forms) = def.items() else {
            return Err(Error::MalformedClause(def.to_string()));
        };
        let Some((head, body)) = forms.split_first() else {
            return Err(Error::MalformedClause(def.to_string()));
        };
        let Edn::List(head_forms) = head else {
            return Err(Error::MalformedClause(head.to_string()));
        };
        let Some((name_form, arg_forms)) = head_forms.split_first() else {
            return Err(Error::MalformedClause(head.to_string()));
        };
        let Some(name) = name_form.as_symbol() else {
            return Err(Error::MalformedClause(head.to_string()));
        };
        let (required, free) = parse_head_vars(arg_forms)?;
        let clauses = body.iter().map(parse_clause).collect::<Result<Vec<_>>>()?;
        if let Some(existing) = rules.iter_mut().find(|r| r.name == name) {
            if existing.required != required || existing.free != free {
                return Err(Error::MalformedClause(format!(
                    "rule {name} redefined with different head"
                )));
            }
            existing.branches.push(clauses);
        } else {
            rules.push(Rule {
                name: name.to_string(),
                required,
                free,
                branches: vec![clauses],
            });
        }
    }
    Ok(rules)
}

/// `[?a ?b]` or `[[?a] ?b]`: leading vector marks required vars.
fn parse_head_vars(forms: &[Edn]) -> Result<(Vec<Var>, Vec<Var>)> {
    let mut required = Vec::new();
    let mut free = Vec::new();
    for (i, f) in forms.iter().enumerate() {
        match f {
            Edn::Vector(inner) if i == 0 => {
                for v in inner {
                    required.push(expect_var(v)?);
                }
            }
            _ => free.push(expect_var(f)?),
        }
    }
    Ok((required, free))
}

fn expect_var(edn: &Edn) -> Result<Var> {
    match edn.as_symbol() {
        Some(s) if s.starts_with('?') => Ok(s.to_string()),
        _ => Err(Error::MalformedClause(format!("expected variable, got {edn}"))),
    }
}

fn shape_query(edn: &Edn) -> Result<Query> {
    let sections: Vec<(String, Vec<Edn>)> = match edn {
        Edn::Vector(forms) => {
            let mut sections: Vec<(String, Vec<Edn>)> = Vec::new();
            for form in forms {
                if let Edn::Keyword(k) = form {
                    sections.push((k.clone(), Vec::new()));
                } else if let Some((_, vals)) = sections.last_mut() {
                    vals.push(form.clone());
                } else {
                    return Err(Error::MalformedQuery(format!(
                        "expected section keyword, got {form}"
                    )));
                }
            }
            sections
        }
        Edn::Map(pairs) => pairs
            .iter()
            .map(|(k, v)| {
                let Edn::Keyword(name) = k else {
                    return Err(Error::MalformedQuery(format!("bad query key {k}")));
                };
                let vals = v.items().map(|s| s.to_vec()).unwrap_or_else(|| vec![v.clone()]);
                Ok((name.clone(), vals))
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(Error::MalformedQuery(format!(
                "query must be a vector or map, got {other}"
            )))
        }
    };

    let mut find = None;
    let mut with = Vec::new();
    let mut inputs = Vec::new();
    let mut where_ = Vec::new();
    let mut keys = None;
    for (name, vals) in sections {
        match name.as_str() {
            "find" => find = Some(parse_find(&vals)?),
            "with" => {
                for v in &vals {
                    with.push(expect_var(v)?);
                }
            }
            "in" => {
                for v in &vals {
                    inputs.push(parse_in(v)?);
                }
            }
            "where" => {
                for v in &vals {
                    where_.push(parse_clause(v)?);
                }
            }
            "keys" | "strs" | "syms" => {
                let style = match name.as_str() {
                    "keys" => KeyStyle::Keys,
                    "strs" => KeyStyle::Strs,
                    _ => KeyStyle::Syms,
                };
                let names = vals
                    .iter()
                    .map(|v| match v {
                        Edn::Symbol(s) => Ok(s.clone()),
                        Edn::Keyword(s) => Ok(s.clone()),
                        other => Err(Error::MalformedQuery(format!("bad key name {other}"))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                keys = Some((style, names));
            }
            other => {
                return Err(Error::MalformedQuery(format!("unknown section :{other}")));
            }
        }
    }
    let find = find.ok_or_else(|| Error::MalformedQuery("missing :find".into()))?;
    if inputs.is_empty() {
        inputs.push(InBinding::Source("$".to_string()));
    }
    if let Some((_, names)) = &keys {
        if names.len() != find.vars().len() {
            return Err(Error::MalformedQuery(
                ":keys arity differs from :find".into(),
            ));
        }
    }
    Ok(Query {
        find,
        with,
        inputs,
        where_,
        keys,
    })
}

fn parse_find(forms: &[Edn]) -> Result<FindSpec> {
    match forms {
        [] => Err(Error::MalformedQuery("empty :find".into())),
        [Edn::Vector(inner)] => {
            // [?x ...] collection or [?x ?y] tuple
            if inner.len() == 2 && inner[1].as_symbol() == Some("...") {
                Ok(FindSpec::Coll(expect_var(&inner[0])?))
            } else {
                Ok(FindSpec::Tuple(
                    inner.iter().map(expect_var).collect::<Result<Vec<_>>>()?,
                ))
            }
        }
        [v, Edn::Symbol(dot)] if dot == "." => Ok(FindSpec::Scalar(expect_var(v)?)),
        vars => Ok(FindSpec::Rel(
            vars.iter().map(expect_var).collect::<Result<Vec<_>>>()?,
        )),
    }
}

fn parse_in(form: &Edn) -> Result<InBinding> {
    match form {
        Edn::Symbol(s) if s.starts_with('$') => Ok(InBinding::Source(s.clone())),
        Edn::Symbol(s) if s == "%" => Ok(InBinding::Rules),
        Edn::Symbol(s) if s.starts_with('?') => Ok(InBinding::Scalar(s.clone())),
        Edn::Vector(inner) => match inner.as_slice() {
            [Edn::Vector(rel_vars)] => Ok(InBinding::Rel(
                rel_vars.iter().map(expect_var).collect::<Result<Vec<_>>>()?,
            )),
            [v, Edn::Symbol(dots)] if dots == "..." => Ok(InBinding::Coll(expect_var(v)?)),
            vars => Ok(InBinding::Tuple(
                vars.iter().map(expect_var).collect::<Result<Vec<_>>>()?,
            )),
        },
        other => Err(Error::MalformedQuery(format!("bad :in binding {other}"))),
    }
}

/// Convert an EDN literal to a value. Vectors become tuples, which also
/// covers lookup refs in pattern position.
pub fn edn_to_value(edn: &Edn) -> Result<Value> {
    Ok(match edn {
        Edn::Nil => Value::Nil,
        Edn::Bool(b) => Value::Bool(*b),
        Edn::Long(n) => Value::Long(*n),
        Edn::Double(d) => Value::Double(*d),
        Edn::Str(s) => Value::Str(s.clone()),
        Edn::Keyword(k) => Value::Keyword(Keyword::parse(k)?),
        Edn::Symbol(s) => Value::Symbol(s.clone()),
        Edn::Vector(items) => Value::Tuple(
            items
                .iter()
                .map(edn_to_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(Error::MalformedClause(format!(
                "cannot use {other} as a constant"
            )))
        }
    })
}

fn parse_term(edn: &Edn) -> Result<Term> {
    Ok(match edn {
        Edn::Symbol(s) if s == "_" => Term::Blank,
        Edn::Symbol(s) if s.starts_with('?') => Term::Var(s.clone()),
        other => Term::Const(edn_to_value(other)?),
    })
}

/// Parse one `:where` clause.
pub fn parse_clause(edn: &Edn) -> Result<Clause> {
    match edn {
        Edn::Vector(items) => parse_vector_clause(edn, items),
        Edn::List(items) => parse_list_clause(edn, items, None),
        other => Err(Error::MalformedClause(other.to_string())),
    }
}

/// `[...]`: a data pattern, `[(pred ...)]`, or `[(f ...) binding]`.
fn parse_vector_clause(whole: &Edn, items: &[Edn]) -> Result<Clause> {
    if items.is_empty() {
        return Err(Error::MalformedClause(whole.to_string()));
    }
    if let Edn::List(call) = &items[0] {
        let Some((op_form, arg_forms)) = call.split_first() else {
            return Err(Error::MalformedClause(whole.to_string()));
        };
        let Some(op) = op_form.as_symbol() else {
            return Err(Error::MalformedClause(whole.to_string()));
        };
        let args = arg_forms.iter().map(parse_term).collect::<Result<Vec<_>>>()?;
        return match items.len() {
            1 => Ok(Clause::Pred {
                op: op.to_string(),
                args,
            }),
            2 => Ok(Clause::Fn {
                op: op.to_string(),
                args,
                binding: parse_fn_binding(&items[1])?,
            }),
            _ => Err(Error::MalformedClause(whole.to_string())),
        };
    }

    // data pattern, optionally source-prefixed
    let (src, rest) = match items[0].as_symbol() {
        Some(s) if s.starts_with('$') => (Some(s.to_string()), &items[1..]),
        _ => (None, items),
    };
    if rest.is_empty() || rest.len() > 4 {
        return Err(Error::MalformedClause(whole.to_string()));
    }
    let mut terms = rest.iter().map(parse_term).collect::<Result<Vec<_>>>()?;
    while terms.len() < 4 {
        terms.push(Term::Blank);
    }
    let tx = terms.pop().unwrap();
    let v = terms.pop().unwrap();
    let a = terms.pop().unwrap();
    let e = terms.pop().unwrap();
    Ok(Clause::Pattern(Pattern { src, e, a, v, tx }))
}

fn parse_fn_binding(edn: &Edn) -> Result<FnBinding> {
    match edn {
        Edn::Symbol(s) if s.starts_with('?') => Ok(FnBinding::Scalar(s.clone())),
        Edn::Vector(inner) => match inner.as_slice() {
            [Edn::Vector(rel_vars)] => Ok(FnBinding::Rel(
                rel_vars.iter().map(expect_var).collect::<Result<Vec<_>>>()?,
            )),
            [v, Edn::Symbol(dots)] if dots == "..." => Ok(FnBinding::Coll(expect_var(v)?)),
            vars => Ok(FnBinding::Tuple(
                vars.iter().map(expect_var).collect::<Result<Vec<_>>>()?,
            )),
        },
        other => Err(Error::MalformedClause(format!("bad binding {other}"))),
    }
}

/// `(...)`: not, not-join, or, or-join, source scope, or a rule call.
fn parse_list_clause(whole: &Edn, items: &[Edn], src: Option<String>) -> Result<Clause> {
    let Some((head, rest)) = items.split_first() else {
        return Err(Error::MalformedClause(whole.to_string()));
    };
    let Some(sym) = head.as_symbol() else {
        return Err(Error::MalformedClause(whole.to_string()));
    };

    if sym.starts_with('$') && src.is_none() {
        // ($src or ...) rebinding for a single nested clause, or
        // ($src clause+) scoping a block
        if let Some(inner_head) = rest.first().and_then(|f| f.as_symbol()) {
            if matches!(inner_head, "or" | "or-join" | "not" | "not-join") {
                return parse_list_clause(whole, rest, Some(sym.to_string()));
            }
        }
        let clauses = rest.iter().map(parse_clause).collect::<Result<Vec<_>>>()?;
        return Ok(Clause::SourceScope {
            src: sym.to_string(),
            clauses,
        });
    }

    match sym {
        "not" => Ok(Clause::Not {
            src,
            vars: Vec::new(),
            clauses: rest.iter().map(parse_clause).collect::<Result<Vec<_>>>()?,
        }),
        "not-join" => {
            let Some((vars_form, body)) = rest.split_first() else {
                return Err(Error::MalformedClause(whole.to_string()));
            };
            let Some(var_forms) = vars_form.items() else {
                return Err(Error::MalformedClause(whole.to_string()));
            };
            let vars = var_forms.iter().map(expect_var).collect::<Result<Vec<_>>>()?;
            if vars.is_empty() {
                return Err(Error::MalformedClause(whole.to_string()));
            }
            Ok(Clause::Not {
                src,
                vars,
                clauses: body.iter().map(parse_clause).collect::<Result<Vec<_>>>()?,
            })
        }
        "or" => {
            let branches = parse_or_branches(rest)?;
            check_or_branch_vars(&branches)?;
            Ok(Clause::Or {
                src,
                join: None,
                branches,
            })
        }
        "or-join" => {
            let Some((spec_form, body)) = rest.split_first() else {
                return Err(Error::MalformedClause(whole.to_string()));
            };
            let Edn::Vector(spec_items) = spec_form else {
                return Err(Error::MalformedClause(whole.to_string()));
            };
            let mut required = Vec::new();
            let mut free = Vec::new();
            for item in spec_items {
                match item {
                    Edn::Vector(inner) => {
                        for v in inner {
                            required.push(expect_var(v)?);
                        }
                    }
                    other => free.push(expect_var(other)?),
                }
            }
            Ok(Clause::Or {
                src,
                join: Some(OrJoinSpec { required, free }),
                branches: parse_or_branches(body)?,
            })
        }
        "and" => Err(Error::MalformedClause(
            "(and ...) is only valid inside (or ...)".into(),
        )),
        name => Ok(Clause::RuleCall {
            name: name.to_string(),
            args: rest.iter().map(parse_term).collect::<Result<Vec<_>>>()?,
        }),
    }
}

fn parse_or_branches(forms: &[Edn]) -> Result<Vec<Vec<Clause>>> {
    forms
        .iter()
        .map(|f| match f {
            Edn::List(items) if items.first().and_then(|h| h.as_symbol()) == Some("and") => {
                items[1..].iter().map(parse_clause).collect()
            }
            other => Ok(vec![parse_clause(other)?]),
        })
        .collect()
}

/// Every branch of an `or` must use the same set of free variables.
fn check_or_branch_vars(branches: &[Vec<Clause>]) -> Result<()> {
    let mut first: Option<BTreeSet<Var>> = None;
    for branch in branches {
        let mut vars = FxHashSet::default();
        for clause in branch {
            clause_vars(clause, &mut vars);
        }
        let vars: BTreeSet<Var> = vars.into_iter().collect();
        match &first {
            None => first = Some(vars),
            Some(expected) if *expected != vars => {
                return Err(Error::OrVarsMismatch(
                    format!("{:?}", expected.iter().collect::<Vec<_>>()),
                    format!("{:?}", vars.iter().collect::<Vec<_>>()),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Collect every variable a clause mentions.
pub fn clause_vars(clause: &Clause, out: &mut FxHashSet<Var>) {
    let mut term = |t: &Term, out: &mut FxHashSet<Var>| {
        if let Term::Var(v) = t {
            out.insert(v.clone());
        }
    };
    match clause {
        Clause::Pattern(p) => {
            term(&p.e, out);
            term(&p.a, out);
            term(&p.v, out);
            term(&p.tx, out);
        }
        Clause::Pred { args, .. } => {
            for a in args {
                term(a, out);
            }
        }
        Clause::Fn { args, binding, .. } => {
            for a in args {
                term(a, out);
            }
            for v in binding.vars() {
                out.insert(v);
            }
        }
        Clause::Not { clauses, .. } | Clause::SourceScope { clauses, .. } => {
            for c in clauses {
                clause_vars(c, out);
            }
        }
        Clause::Or { branches, .. } => {
            for b in branches {
                for c in b {
                    clause_vars(c, out);
                }
            }
        }
        Clause::RuleCall { args, .. } => {
            for a in args {
                term(a, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalith_core::kw;

    #[test]
    fn test_parse_basic_query() {
        let q = parse_query("[:find ?e :where [?e :name \"Ivan\"]]").unwrap();
        assert_eq!(q.find, FindSpec::Rel(vec!["?e".into()]));
        assert_eq!(q.inputs, vec![InBinding::Source("$".into())]);
        assert_eq!(q.where_.len(), 1);
        let Clause::Pattern(p) = &q.where_[0] else {
            panic!()
        };
        assert_eq!(p.e, Term::Var("?e".into()));
        assert_eq!(p.a, Term::Const(Value::Keyword(kw(":name"))));
        assert_eq!(p.v, Term::Const("Ivan".into()));
        assert_eq!(p.tx, Term::Blank);
    }

    #[test]
    fn test_find_shapes() {
        assert!(matches!(
            parse_query("[:find ?e . :where [?e :x]]").unwrap().find,
            FindSpec::Scalar(_)
        ));
        assert!(matches!(
            parse_query("[:find [?e ...] :where [?e :x]]").unwrap().find,
            FindSpec::Coll(_)
        ));
        assert!(matches!(
            parse_query("[:find [?e ?n] :where [?e :x ?n]]").unwrap().find,
            FindSpec::Tuple(_)
        ));
    }

    #[test]
    fn test_map_form() {
        let q = parse_query("{:find [?e] :where [[?e :name]]}").unwrap();
        assert_eq!(q.find, FindSpec::Rel(vec!["?e".into()]));
        assert_eq!(q.where_.len(), 1);
    }

    #[test]
    fn test_in_bindings() {
        let q = parse_query(
            "[:find ?e :in $ $2 % ?x [?a ?b] [?c ...] [[?r1 ?r2]] :where [?e :x ?x]]",
        )
        .unwrap();
        assert_eq!(
            q.inputs,
            vec![
                InBinding::Source("$".into()),
                InBinding::Source("$2".into()),
                InBinding::Rules,
                InBinding::Scalar("?x".into()),
                InBinding::Tuple(vec!["?a".into(), "?b".into()]),
                InBinding::Coll("?c".into()),
                InBinding::Rel(vec!["?r1".into(), "?r2".into()]),
            ]
        );
    }

    #[test]
    fn test_pred_and_fn_clauses() {
        let q = parse_query(
            "[:find ?x :where [?e :age ?a] [(< ?a 18)] [(+ ?a 1) ?x]]",
        )
        .unwrap();
        assert!(matches!(&q.where_[1], Clause::Pred { op, .. } if op == "<"));
        let Clause::Fn { op, binding, .. } = &q.where_[2] else {
            panic!()
        };
        assert_eq!(op, "+");
        assert_eq!(*binding, FnBinding::Scalar("?x".into()));
    }

    #[test]
    fn test_or_same_free_vars_enforced() {
        let ok = parse_query(
            "[:find ?e :where (or [?e :name \"Oleg\"] [?e :age 10])]",
        );
        assert!(ok.is_ok());

        let err = parse_query(
            "[:find ?e :where (or [?e :name \"Oleg\"] [?x :age 10])]",
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("All clauses in 'or' must use same set of free vars"));
    }

    #[test]
    fn test_or_join_spec() {
        let q = parse_query(
            "[:find ?e :where (or-join [[?x] ?e] [?e :friend ?x] (and [?e :age ?x] [?e :name _]))]",
        )
        .unwrap();
        let Clause::Or { join: Some(spec), branches, .. } = &q.where_[0] else {
            panic!()
        };
        assert_eq!(spec.required, vec!["?x".to_string()]);
        assert_eq!(spec.free, vec!["?e".to_string()]);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].len(), 2);
    }

    #[test]
    fn test_not_join_and_source_scope() {
        let q = parse_query(
            "[:find ?e :in $ $2 :where ($2 [?e :name ?n]) (not-join [?e] [?e :banned true])]",
        )
        .unwrap();
        assert!(matches!(&q.where_[0], Clause::SourceScope { src, .. } if src == "$2"));
        let Clause::Not { vars, .. } = &q.where_[1] else {
            panic!()
        };
        assert_eq!(vars, &vec!["?e".to_string()]);
    }

    #[test]
    fn test_rule_parsing() {
        let rules = parse_rules(
            "[[(ancestor ?a ?b) [?a :parent ?b]]
              [(ancestor ?a ?b) [?a :parent ?t] (ancestor ?t ?b)]]",
        )
        .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "ancestor");
        assert_eq!(rules[0].branches.len(), 2);
        assert_eq!(rules[0].free, vec!["?a".to_string(), "?b".to_string()]);
    }

    #[test]
    fn test_source_prefixed_pattern() {
        let q = parse_query("[:find ?e :in $2 :where [$2 ?e :name]]").unwrap();
        let Clause::Pattern(p) = &q.where_[0] else {
            panic!()
        };
        assert_eq!(p.src.as_deref(), Some("$2"));
    }

    #[test]
    fn test_lookup_ref_constant() {
        let q = parse_query("[:find ?v :where [[:email \"a@x\"] :name ?v]]").unwrap();
        let Clause::Pattern(p) = &q.where_[0] else {
            panic!()
        };
        assert_eq!(
            p.e,
            Term::Const(Value::Tuple(vec![
                Value::Keyword(kw(":email")),
                "a@x".into()
            ]))
        );
    }
}
