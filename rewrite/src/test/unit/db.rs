use std::collections::BTreeSet;
use std::sync::Arc;

use test_case::test_case;
use tessera_dtype::DType;
use tessera_ir::{FunctionGraph, OpClass, UnaryOp, Variable};

use crate::config::RewriteConfig;
use crate::db::{Entry, EquilibriumDb, RewriteDb, RewriteQuery, SequenceDb};
use crate::error::Error;
use crate::pattern::PatternMatcher;
use crate::rewriter::NodeRewriter;

/// `from(x) → to(x)`.
fn swap(name: &str, from: UnaryOp, to: UnaryOp) -> PatternMatcher {
    PatternMatcher::new(name).with(&[OpClass::Unary(from)], move |_, node| {
        Ok(Some(vec![Variable::elemwise(to, [node.inputs()[0].clone()])?]))
    })
}

fn tags(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn exp_graph() -> (FunctionGraph, Variable) {
    let x = Variable::scalar("x", DType::Float64);
    let out = x.try_exp().unwrap();
    (FunctionGraph::new([x.clone()], [out]).unwrap(), x)
}

fn output_op(fgraph: &FunctionGraph) -> OpClass {
    fgraph.outputs()[0].owner().unwrap().op().key()
}

#[test_case(&["a"], &[], &[], &["a", "b"], true ; "any include tag")]
#[test_case(&["c"], &[], &[], &["a", "b"], false ; "no include tag")]
#[test_case(&["rule"], &[], &[], &["a"], true ; "included by name")]
#[test_case(&["a"], &["b"], &[], &["a", "b"], true ; "required present")]
#[test_case(&["a"], &["c"], &[], &["a", "b"], false ; "required missing")]
#[test_case(&["a"], &[], &["b"], &["a", "b"], false ; "excluded")]
fn test_query_selects(include: &[&str], require: &[&str], exclude: &[&str], entry_tags: &[&str], expected: bool) {
    let query = RewriteQuery::new()
        .including(include.iter().copied())
        .requiring(require.iter().copied())
        .excluding(exclude.iter().copied());
    assert_eq!(query.selects("rule", &tags(entry_tags)), expected);
}

#[test]
fn test_duplicate_entry_rejected() {
    let mut db = EquilibriumDb::new("db");
    db.register("r", Entry::node(swap("r", UnaryOp::Exp, UnaryOp::Log)), &["t"]).unwrap();
    let err = db.register("r", Entry::node(swap("r", UnaryOp::Exp, UnaryOp::Log)), &["t"]).unwrap_err();
    assert_eq!(err, Error::DuplicateEntry { db: "db".into(), name: "r".into() });
}

#[test]
fn test_unknown_entry() {
    let mut db = SequenceDb::new("db");
    assert!(matches!(db.database().entry("missing"), Err(Error::UnknownEntry { .. })));
    assert!(matches!(db.database_mut().add_tags("missing", &["t"]), Err(Error::UnknownEntry { .. })));
    assert!(matches!(db.database_mut().remove("missing"), Err(Error::UnknownEntry { .. })));
}

#[test]
fn test_tags_and_remove() {
    let mut db = EquilibriumDb::new("db");
    db.register("r", Entry::node(swap("r", UnaryOp::Exp, UnaryOp::Log)), &["b", "a"]).unwrap();
    db.database_mut().add_tags("r", &["c"]).unwrap();
    assert_eq!(db.database().tags("r").unwrap(), vec!["a", "b", "c"]);

    db.database_mut().remove("r").unwrap();
    assert!(db.database().is_empty());
    assert!(!db.database().contains("r"));
}

#[test]
fn test_equilibrium_db_query_filters_by_tag() {
    let mut db = EquilibriumDb::new("db");
    db.register("to_log", Entry::node(swap("to_log", UnaryOp::Exp, UnaryOp::Log)), &["fast"]).unwrap();
    db.register("to_sin", Entry::node(swap("to_sin", UnaryOp::Exp, UnaryOp::Sin)), &["slow"]).unwrap();

    let (mut fgraph, _) = exp_graph();
    let rewriter = db.query(&RewriteQuery::new().including(["slow"])).unwrap();
    let report = rewriter.apply(&mut fgraph, &RewriteConfig::default()).unwrap();

    assert_eq!(rewriter.name(), "db");
    assert_eq!(report.count("to_sin"), 1);
    assert_eq!(report.count("to_log"), 0);
    assert_eq!(output_op(&fgraph), OpClass::Unary(UnaryOp::Sin));
}

#[test]
fn test_final_rewriters_run_after_node_rewriters() {
    let mut db = EquilibriumDb::new("db");
    let to_cos: Arc<dyn NodeRewriter> = Arc::new(swap("to_cos", UnaryOp::Sin, UnaryOp::Cos));
    db.register_final("to_cos", to_cos, &["t"]).unwrap();
    db.register("to_sin", Entry::node(swap("to_sin", UnaryOp::Exp, UnaryOp::Sin)), &["t"]).unwrap();

    let (mut fgraph, _) = exp_graph();
    let rewriter = db.query(&RewriteQuery::new().including(["t"])).unwrap();
    let report = rewriter.apply(&mut fgraph, &RewriteConfig::default()).unwrap();

    assert!(report.fixed_point);
    assert_eq!(report.count("to_sin"), 1);
    assert_eq!(report.count("to_cos"), 1);
    assert_eq!(output_op(&fgraph), OpClass::Unary(UnaryOp::Cos));
}

#[test]
fn test_sequence_db_orders_by_position() {
    let mut db = SequenceDb::new("seq");
    db.register("late", Entry::node(swap("late", UnaryOp::Sin, UnaryOp::Cos)), 2.0, &["t"]).unwrap();
    db.register("early", Entry::node(swap("early", UnaryOp::Exp, UnaryOp::Sin)), 1.0, &["t"]).unwrap();
    assert_eq!(db.database().names(), vec!["late", "early"]);

    let (mut fgraph, _) = exp_graph();
    let rewriter = db.query(&RewriteQuery::new().including(["t"])).unwrap();
    let report = rewriter.apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.total(), 2);
    assert_eq!(output_op(&fgraph), OpClass::Unary(UnaryOp::Cos));
}

#[test]
fn test_sequence_db_equal_positions_keep_registration_order() {
    let mut db = SequenceDb::new("seq");
    db.register("first", Entry::node(swap("first", UnaryOp::Exp, UnaryOp::Sin)), 1.0, &["t"]).unwrap();
    db.register("second", Entry::node(swap("second", UnaryOp::Exp, UnaryOp::Tanh)), 1.0, &["t"]).unwrap();

    let (mut fgraph, _) = exp_graph();
    db.query(&RewriteQuery::new().including(["t"])).unwrap().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(output_op(&fgraph), OpClass::Unary(UnaryOp::Sin));
}

#[test]
fn test_nested_db_subquery() {
    let mut inner = EquilibriumDb::new("inner");
    inner.register("to_log", Entry::node(swap("to_log", UnaryOp::Exp, UnaryOp::Log)), &["a"]).unwrap();
    inner.register("to_sin", Entry::node(swap("to_sin", UnaryOp::Exp, UnaryOp::Sin)), &["b"]).unwrap();

    let mut outer = SequenceDb::new("outer");
    outer.register("inner", Entry::db(inner), 1.0, &["stage"]).unwrap();

    // The parent query is reused when no subquery is given; it selects no
    // inner rule.
    let (mut fgraph, _) = exp_graph();
    let plain = RewriteQuery::new().including(["stage"]);
    let report = outer.query(&plain).unwrap().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.total(), 0);

    let (mut fgraph, _) = exp_graph();
    let query = plain.with_subquery("inner", RewriteQuery::new().including(["b"]));
    let report = outer.query(&query).unwrap().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.count("to_sin"), 1);
    assert_eq!(output_op(&fgraph), OpClass::Unary(UnaryOp::Sin));
}
