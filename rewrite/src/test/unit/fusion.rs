use tessera_dtype::DType;
use tessera_ir::{FunctionGraph, LinalgKind, Op, OpClass, ScalarOp, Variable};

use crate::config::RewriteConfig;
use crate::rewriter::GraphRewriter;
use crate::rules::ElemwiseFusion;
use crate::test::evaluate_scalars;

fn composite_depth(var: &Variable) -> Option<usize> {
    match var.owner()?.op() {
        Op::Elemwise(ScalarOp::Composite(c)) => Some(c.depth()),
        _ => None,
    }
}

#[test]
fn test_chain_fused_into_one_node() {
    let [x, y, z] = ["x", "y", "z"].map(|n| Variable::scalar(n, DType::Float64));
    let out = x.try_add(&y).unwrap().try_exp().unwrap().try_mul(&z).unwrap();
    let mut fgraph = FunctionGraph::new([x.clone(), y.clone(), z.clone()], [out]).unwrap();
    let expected = evaluate_scalars(&fgraph, &[0.5, -0.25, 3.0]);

    let report = ElemwiseFusion::new().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.count("elemwise_fusion"), 1);
    assert!(report.fixed_point);
    assert_eq!(fgraph.num_nodes(), 1);

    let owner = fgraph.outputs()[0].owner().unwrap().clone();
    assert_eq!(owner.op().key(), OpClass::Composite);
    assert_eq!(owner.inputs(), &[x, y, z]);
    assert_eq!(evaluate_scalars(&fgraph, &[0.5, -0.25, 3.0]), expected);
    fgraph.check_integrity().unwrap();
}

#[test]
fn test_shared_intermediate_not_fused() {
    let [x, y] = ["x", "y"].map(|n| Variable::vector(n, DType::Float64));
    let shared = x.try_mul(&y).unwrap();
    let a = shared.try_exp().unwrap().try_neg().unwrap();
    let b = shared.try_sin().unwrap();
    let mut fgraph = FunctionGraph::new([x, y], [a, b]).unwrap();

    ElemwiseFusion::new().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    // mul feeds two consumers and stays; exp and neg fuse; sin stands alone.
    assert_eq!(fgraph.num_nodes(), 3);
    assert!(fgraph.contains_variable(&shared));
    assert_eq!(fgraph.outputs()[0].owner().unwrap().op().key(), OpClass::Composite);
    assert_eq!(fgraph.outputs()[0].owner().unwrap().inputs()[0], shared);
    fgraph.check_integrity().unwrap();
}

#[test]
fn test_graph_output_not_absorbed() {
    let x = Variable::scalar("x", DType::Float64);
    let inner = x.try_exp().unwrap();
    let outer = inner.try_sqr().unwrap().try_neg().unwrap();
    let mut fgraph = FunctionGraph::new([x], [inner.clone(), outer]).unwrap();

    ElemwiseFusion::new().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(fgraph.outputs()[0], inner);
    assert_eq!(fgraph.num_nodes(), 2);
    assert_eq!(fgraph.outputs()[1].owner().unwrap().inputs()[0], inner);
}

#[test]
fn test_scalar_constants_inlined() {
    let x = Variable::vector("x", DType::Float32);
    let two = Variable::scalar_constant(DType::Float32, 2.0);
    let out = x.try_mul(&two).unwrap().try_tanh().unwrap();
    let mut fgraph = FunctionGraph::new([x.clone()], [out]).unwrap();

    ElemwiseFusion::new().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    let owner = fgraph.outputs()[0].owner().unwrap().clone();
    assert_eq!(owner.inputs(), &[x]);
    assert_eq!(fgraph.outputs()[0].dtype(), DType::Float32);
    assert_eq!(composite_depth(&fgraph.outputs()[0]), Some(1));
}

#[test]
fn test_single_node_untouched() {
    let x = Variable::vector("x", DType::Float64);
    let mut fgraph = FunctionGraph::new([x.clone()], [x.try_exp().unwrap()]).unwrap();
    let revision = fgraph.revision();

    let report = ElemwiseFusion::new().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(report.total(), 0);
    assert_eq!(fgraph.revision(), revision);
}

#[test]
fn test_linalg_breaks_chain() {
    let a = Variable::matrix("a", DType::Float64);
    let b = Variable::matrix("b", DType::Float64);
    let product = a.try_exp().unwrap().try_dot(&b).unwrap();
    let out = product.try_neg().unwrap().try_exp().unwrap();
    let mut fgraph = FunctionGraph::new([a, b], [out]).unwrap();

    ElemwiseFusion::new().apply(&mut fgraph, &RewriteConfig::default()).unwrap();
    assert_eq!(fgraph.num_nodes(), 3);
    let root = fgraph.outputs()[0].owner().unwrap().clone();
    assert_eq!(root.op().key(), OpClass::Composite);
    assert_eq!(root.inputs()[0].owner().unwrap().op().key(), OpClass::Linalg(LinalgKind::Dot));
}
