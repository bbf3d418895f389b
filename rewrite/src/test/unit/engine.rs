use std::sync::Arc;

use tessera_dtype::DType;
use tessera_ir::{FunctionGraph, OpClass, UnaryOp, Variable};

use crate::config::RewriteConfig;
use crate::equilibrium::EquilibriumRewriter;
use crate::error::Error;
use crate::pattern::PatternMatcher;
use crate::rewriter::{GraphRewriter, NodeRewriter};
use crate::sequence::SequenceRewriter;
use crate::walk::WalkingRewriter;

fn neg_neg() -> Arc<dyn NodeRewriter> {
    Arc::new(PatternMatcher::new("neg_neg").with(&[OpClass::Unary(UnaryOp::Neg)], |_, node| {
        match node.inputs()[0].owner() {
            Some(inner) if inner.op().key() == OpClass::Unary(UnaryOp::Neg) => {
                Ok(Some(vec![inner.inputs()[0].clone()]))
            }
            _ => Ok(None),
        }
    }))
}

/// Rewrites every `neg(x)` into a fresh `neg(x)`, forever.
fn churn() -> Arc<dyn NodeRewriter> {
    Arc::new(
        PatternMatcher::new("churn")
            .with(&[OpClass::Unary(UnaryOp::Neg)], |_, node| Ok(Some(vec![node.inputs()[0].try_neg()?]))),
    )
}

fn graph_of(x: &Variable, out: Variable) -> FunctionGraph {
    FunctionGraph::new([x.clone()], [out]).unwrap()
}

#[test]
fn test_walk_applies_rewrite() {
    let x = Variable::vector("x", DType::Float64);
    let out = x.try_neg().unwrap().try_neg().unwrap().try_exp().unwrap();
    let mut fgraph = graph_of(&x, out);

    let report =
        WalkingRewriter::in2out("walk", vec![neg_neg()]).apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.count("neg_neg"), 1);
    assert_eq!(report.passes, 1);
    assert!(!report.fixed_point);
    assert_eq!(fgraph.num_nodes(), 1);
    assert_eq!(fgraph.outputs()[0].owner().unwrap().inputs()[0], x);
    fgraph.check_integrity().unwrap();
}

#[test]
fn test_walk_without_match_is_fixed_point() {
    let x = Variable::vector("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_exp().unwrap());
    let revision = fgraph.revision();

    let report =
        WalkingRewriter::out2in("walk", vec![neg_neg()]).apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert!(!report.changed());
    assert!(report.fixed_point);
    assert_eq!(fgraph.revision(), revision);
}

#[test]
fn test_walk_ignore_newtrees() {
    // Removing the inner pair of neg(neg(neg(neg(x)))) rebuilds the outer
    // pair as new nodes.
    let x = Variable::scalar("x", DType::Float64);
    let mut out = x.clone();
    for _ in 0..4 {
        out = out.try_neg().unwrap();
    }

    let mut fgraph = graph_of(&x, out.clone());
    let walker = WalkingRewriter::in2out("walk", vec![neg_neg()]).ignore_newtrees(true);
    walker.apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(fgraph.num_nodes(), 2);
    fgraph.check_integrity().unwrap();

    let mut full = graph_of(&x, out);
    let walker = WalkingRewriter::in2out("walk", vec![neg_neg()]);
    walker.apply(&mut full, &RewriteConfig::default()).unwrap();
    assert_eq!(full.num_nodes(), 0);
    assert_eq!(full.outputs()[0], x);
}

#[test]
fn test_equilibrium_reaches_fixed_point() {
    let x = Variable::scalar("x", DType::Float64);
    let mut out = x.clone();
    for _ in 0..6 {
        out = out.try_neg().unwrap();
    }
    let mut fgraph = graph_of(&x, out.try_exp().unwrap());

    let rewriter = EquilibriumRewriter::new("eq", vec![neg_neg()]);
    let report = rewriter.apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert!(report.fixed_point);
    assert!(!report.budget_exhausted);
    assert_eq!(report.count("neg_neg"), 3);
    assert_eq!(fgraph.num_nodes(), 1);

    let again = rewriter.apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(again.total(), 0);
    assert_eq!(again.passes, 1);
}

#[test]
fn test_equilibrium_stops_at_rewrite_budget() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_neg().unwrap());

    let config = RewriteConfig::builder().max_rewrites(5).build();
    let report = EquilibriumRewriter::new("eq", vec![churn()]).apply(&mut fgraph, &config).unwrap();
    assert!(report.budget_exhausted);
    assert!(!report.fixed_point);
    assert_eq!(report.count("churn"), 5);
    fgraph.check_integrity().unwrap();
}

#[test]
fn test_equilibrium_stops_at_pass_budget() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_neg().unwrap());

    let config = RewriteConfig::builder().max_passes(2).max_rewrites(usize::MAX).build();
    // Changes the graph exactly once per pass.
    let once_per_pass: Arc<dyn GraphRewriter> =
        Arc::new(WalkingRewriter::in2out("walk", vec![churn()]).ignore_newtrees(true));
    let rewriter = EquilibriumRewriter::new("eq", Vec::new()).with_global(vec![once_per_pass]);
    let report = rewriter.apply(&mut fgraph, &config).unwrap();
    assert_eq!(report.passes, 2);
    assert!(report.budget_exhausted);
    assert_eq!(report.count("churn"), 2);
}

#[test]
fn test_rejected_replacement_is_skipped() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_exp().unwrap());
    let revision = fgraph.revision();

    let to_float32: Arc<dyn NodeRewriter> = Arc::new(
        PatternMatcher::new("to_float32")
            .with(&[OpClass::Unary(UnaryOp::Exp)], |_, node| {
                Ok(Some(vec![node.inputs()[0].try_cast(DType::Float32)?]))
            }),
    );
    let report =
        WalkingRewriter::in2out("walk", vec![to_float32]).apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.total(), 0);
    assert_eq!(fgraph.revision(), revision);
}

#[test]
fn test_must_succeed_replacement_error() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_exp().unwrap());

    let to_float32: Arc<dyn NodeRewriter> = Arc::new(
        PatternMatcher::new("to_float32")
            .strict()
            .with(&[OpClass::Unary(UnaryOp::Exp)], |_, node| {
                Ok(Some(vec![node.inputs()[0].try_cast(DType::Float32)?]))
            }),
    );
    let err =
        WalkingRewriter::in2out("walk", vec![to_float32]).apply(&mut fgraph, &RewriteConfig::default()).unwrap_err();
    assert!(matches!(&err, Error::RewriteFailed { rewriter, .. } if rewriter == "to_float32"), "{err}");
}

#[test]
fn test_must_succeed_replacement_count() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_exp().unwrap());

    let twice: Arc<dyn NodeRewriter> = Arc::new(
        PatternMatcher::new("twice")
            .strict()
            .with(&[OpClass::Unary(UnaryOp::Exp)], |_, node| Ok(Some(vec![node.inputs()[0].clone(); 2]))),
    );
    let err = WalkingRewriter::in2out("walk", vec![twice]).apply(&mut fgraph, &RewriteConfig::default()).unwrap_err();
    assert_eq!(err, Error::ReplacementCount { rewriter: "twice".into(), expected: 1, got: 2 });
}

#[test]
fn test_failing_rewriter_does_not_stop_others() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_neg().unwrap().try_neg().unwrap());

    let failing: Arc<dyn NodeRewriter> = Arc::new(
        PatternMatcher::new("failing")
            .with(&[OpClass::Unary(UnaryOp::Neg)], |_, node| Ok(Some(vec![node.inputs()[0].try_not()?]))),
    );
    let report = WalkingRewriter::in2out("walk", vec![failing, neg_neg()])
        .apply(&mut fgraph, &RewriteConfig::default())
        .unwrap();
    assert_eq!(report.count("neg_neg"), 1);
    assert_eq!(fgraph.outputs()[0], x);
}

#[test]
fn test_sequence_runs_in_order() {
    let x = Variable::scalar("x", DType::Float64);
    let mut fgraph = graph_of(&x, x.try_neg().unwrap().try_neg().unwrap().try_exp().unwrap());

    let first: Arc<dyn GraphRewriter> = Arc::new(WalkingRewriter::in2out("first", vec![neg_neg()]));
    let second: Arc<dyn GraphRewriter> = Arc::new(EquilibriumRewriter::new("second", vec![neg_neg()]));
    let sequence = SequenceRewriter::new("seq", vec![first, second]);
    assert_eq!(sequence.names(), vec!["first", "second"]);

    let report = sequence.apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.count("neg_neg"), 1);
    assert_eq!(report.passes, 2);
    assert!(!report.fixed_point);
    assert_eq!(fgraph.num_nodes(), 1);
}

#[test]
fn test_config_builder_defaults() {
    let config = RewriteConfig::builder().build();
    assert_eq!(config, RewriteConfig::default());
    assert_eq!(config.max_passes, 100);
    assert_eq!(config.time_budget, None);
}
