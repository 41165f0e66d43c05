//! Clause ordering
//!
//! Greedy planner: patterns with more bound components run first, every later
//! clause prefers to share at least one variable with the accumulated
//! binding set, and predicates/functions run as soon as their arguments are
//! bound. Result sets are order-independent (they are sets); ordering only
//! changes how much intermediate work the joins do.

use crate::parse::{Clause, Term, Var};
use rustc_hash::FxHashSet;

fn term_bound(t: &Term, bound: &FxHashSet<Var>) -> bool {
    match t {
        Term::Const(_) => true,
        Term::Var(v) => bound.contains(v),
        Term::Blank => false,
    }
}

fn arg_vars(args: &[Term]) -> Vec<&Var> {
    args.iter().filter_map(Term::var).collect()
}

/// Whether the clause can run usefully given the current bindings.
fn eligible(clause: &Clause, bound: &FxHashSet<Var>) -> bool {
    match clause {
        Clause::Pred { args, .. } | Clause::Fn { args, .. } => {
            arg_vars(args).iter().all(|v| bound.contains(*v))
        }
        _ => true,
    }
}

fn shares_var(clause: &Clause, bound: &FxHashSet<Var>) -> bool {
    let mut vars = FxHashSet::default();
    crate::parse::clause_vars(clause, &mut vars);
    vars.iter().any(|v| bound.contains(v))
}

fn score(clause: &Clause, bound: &FxHashSet<Var>) -> i32 {
    match clause {
        // filters and binds are cheap once their inputs exist
        Clause::Pred { .. } => 100,
        Clause::Fn { .. } => 90,
        Clause::Pattern(p) => {
            let bound_comps = [&p.e, &p.a, &p.v]
                .iter()
                .filter(|t| term_bound(t, bound))
                .count() as i32;
            let share = if !bound.is_empty() && shares_var(clause, bound) {
                5
            } else {
                0
            };
            10 * bound_comps + share
        }
        Clause::Not { .. } => {
            if shares_var(clause, bound) {
                4
            } else {
                0
            }
        }
        Clause::Or { .. } | Clause::RuleCall { .. } | Clause::SourceScope { .. } => {
            if shares_var(clause, bound) {
                4
            } else {
                1
            }
        }
    }
}

/// Order clauses for evaluation. Original order is the tie-break, so legal
/// orderings all produce the same result set.
pub fn plan(clauses: &[Clause], initially_bound: &FxHashSet<Var>) -> Vec<Clause> {
    let mut bound = initially_bound.clone();
    let mut pending: Vec<Clause> = clauses.to_vec();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let mut best: Option<(usize, i32)> = None;
        for (i, c) in pending.iter().enumerate() {
            if !eligible(c, &bound) {
                continue;
            }
            let s = score(c, &bound);
            if best.map_or(true, |(_, bs)| s > bs) {
                best = Some((i, s));
            }
        }
        // nothing eligible: keep source order and let evaluation report the
        // unbound-argument error
        let i = best.map(|(i, _)| i).unwrap_or(0);
        let clause = pending.remove(i);
        crate::parse::clause_vars(&clause, &mut bound);
        ordered.push(clause);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_query;

    fn shape(clauses: &[Clause]) -> Vec<&'static str> {
        clauses
            .iter()
            .map(|c| match c {
                Clause::Pattern(_) => "pattern",
                Clause::Pred { .. } => "pred",
                Clause::Fn { .. } => "fn",
                Clause::Not { .. } => "not",
                Clause::Or { .. } => "or",
                Clause::RuleCall { .. } => "rule",
                Clause::SourceScope { .. } => "scope",
            })
            .collect()
    }

    #[test]
    fn test_predicate_deferred_until_args_bound() {
        let q = parse_query("[:find ?e :where [(< ?a 18)] [?e :age ?a]]").unwrap();
        let ordered = plan(&q.where_, &FxHashSet::default());
        assert_eq!(shape(&ordered), vec!["pattern", "pred"]);
    }

    #[test]
    fn test_more_bound_pattern_first() {
        let q = parse_query(
            "[:find ?e ?f :where [?e :friend ?f] [?e :name \"Ivan\"]]",
        )
        .unwrap();
        let ordered = plan(&q.where_, &FxHashSet::default());
        // the (a, v)-bound pattern is more selective
        let Clause::Pattern(first) = &ordered[0] else {
            panic!()
        };
        assert!(matches!(first.v, Term::Const(_)));
    }

    #[test]
    fn test_connected_clause_preferred() {
        let q = parse_query(
            "[:find ?a :where [?x :p ?y] [?z :q ?w] [?y :r ?a]]",
        )
        .unwrap();
        let ordered = plan(&q.where_, &FxHashSet::default());
        // after [?x :p ?y], the ?y-sharing clause beats the disconnected one
        let Clause::Pattern(second) = &ordered[1] else {
            panic!()
        };
        assert_eq!(second.e, Term::Var("?y".into()));
    }
}
