use tessera_dtype::DType;
use tessera_ir::{FunctionGraph, OpClass, UnaryOp, Variable};

use crate::config::RewriteConfig;
use crate::db::{RewriteDb, RewriteQuery};
use crate::standard::{FAST_COMPILE, FAST_RUN, FUSION, default_rewrites, standard_rewrites};
use crate::test::evaluate_scalars;

fn run(query: &RewriteQuery, fgraph: &mut FunctionGraph) -> crate::RewriteReport {
    let rewriter = default_rewrites().unwrap().query(query).unwrap();
    let report = rewriter.apply(fgraph, &RewriteConfig::default()).unwrap();
    fgraph.check_integrity().unwrap();
    report
}

#[test]
fn test_stage_order() {
    let db = standard_rewrites().unwrap();
    assert_eq!(db.database().names(), vec!["canonicalize", "stabilize", "specialize", "useless", "elemwise_fusion"]);
    assert_eq!(db.database().tags("elemwise_fusion").unwrap(), vec![FAST_RUN, FUSION]);
}

#[test]
fn test_default_is_shared() {
    let a = default_rewrites().unwrap();
    let b = default_rewrites().unwrap();
    assert!(std::ptr::eq(a, b));
}

#[test]
fn test_fast_run_stabilizes() {
    let x = Variable::vector("x", DType::Float64);
    let one = Variable::scalar_constant(DType::Float64, 1.0);
    let out = one.try_add(&x.try_exp().unwrap()).unwrap().try_log().unwrap();
    let mut fgraph = FunctionGraph::new([x], [out]).unwrap();

    let report = run(&RewriteQuery::new().including([FAST_RUN]), &mut fgraph);
    assert_eq!(report.count("local_log1p_exp_to_softplus"), 1);
    assert_eq!(fgraph.num_nodes(), 1);
    assert_eq!(fgraph.outputs()[0].owner().unwrap().op().key(), OpClass::Unary(UnaryOp::Softplus));
}

#[test]
fn test_fast_compile_skips_stabilize_and_fusion() {
    let x = Variable::vector("x", DType::Float64);
    let one = Variable::scalar_constant(DType::Float64, 1.0);
    let out = one.try_add(&x.try_exp().unwrap()).unwrap().try_log().unwrap();
    let mut fgraph = FunctionGraph::new([x], [out]).unwrap();

    let report = run(&RewriteQuery::new().including([FAST_COMPILE]), &mut fgraph);
    assert_eq!(report.count("local_log1p_exp_to_softplus"), 0);
    assert_eq!(report.count("elemwise_fusion"), 0);
    assert_eq!(fgraph.num_nodes(), 3);
}

#[test]
fn test_excluding_fusion() {
    let x = Variable::scalar("x", DType::Float64);
    let out = x.try_sin().unwrap().try_cos().unwrap();
    let mut fgraph = FunctionGraph::new([x], [out]).unwrap();

    run(&RewriteQuery::new().including([FAST_RUN]).excluding([FUSION]), &mut fgraph);
    assert_eq!(fgraph.num_nodes(), 2);

    run(&RewriteQuery::new().including([FAST_RUN]), &mut fgraph);
    assert_eq!(fgraph.num_nodes(), 1);
    assert_eq!(fgraph.outputs()[0].owner().unwrap().op().key(), OpClass::Composite);
}

#[test]
fn test_full_pipeline_preserves_values_and_is_idempotent() {
    let [x, y] = ["x", "y"].map(|n| Variable::scalar(n, DType::Float64));
    let zero = Variable::scalar_constant(DType::Float64, 0.0);
    let two = Variable::scalar_constant(DType::Float64, 2.0);
    let out = x
        .try_add(&zero)
        .unwrap()
        .try_pow(&two)
        .unwrap()
        .try_mul(&y.try_neg().unwrap().try_neg().unwrap())
        .unwrap()
        .try_exp()
        .unwrap()
        .try_sub(&Variable::scalar_constant(DType::Float64, 1.0))
        .unwrap();
    let mut fgraph = FunctionGraph::new([x, y], [out]).unwrap();
    let inputs = [0.3, -0.7];
    let expected = evaluate_scalars(&fgraph, &inputs)[0];

    let query = RewriteQuery::new().including([FAST_RUN]);
    let report = run(&query, &mut fgraph);
    assert!(report.changed());
    assert_eq!(report.count("local_neutral_elements"), 2);
    assert_eq!(report.count("local_pow_specialize"), 1);
    assert_eq!(report.count("local_expm1"), 1);

    let actual = evaluate_scalars(&fgraph, &inputs)[0];
    assert!((actual - expected).abs() <= 1e-12 * expected.abs().max(1.0), "{actual} vs {expected}");

    let again = run(&query, &mut fgraph);
    assert_eq!(again.total(), 0);
}
