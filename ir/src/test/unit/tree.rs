use tessera_dtype::DType;

use crate::{FunctionGraph, Variable};

#[test]
fn test_tree_simple() {
    let x = Variable::vector("x", DType::Float32);
    let one = Variable::scalar_constant(DType::Float32, 1.0);
    let sum = x.try_add(&one).unwrap();

    let tree = sum.tree().unwrap();
    println!("Tree output:\n{tree}");
    assert!(tree.contains("add : float32[?]"));
    assert!(tree.contains("CONST 1:float32"));
    assert!(tree.contains("x : float32[?]"));
}

#[test]
fn test_tree_shared_nodes() {
    let x = Variable::scalar("x", DType::Float64);
    let shared = x.try_exp().unwrap();
    let out = shared.try_mul(&shared).unwrap();

    let tree = out.tree().unwrap();
    println!("Compact tree:\n{tree}");
    assert!(tree.contains("see above"));
    assert_eq!(tree.matches("exp").count(), 1);
}

#[test]
fn test_graph_tree_lists_outputs() {
    let a = Variable::matrix("a", DType::Float64);
    let (q, r) = a.try_qr().unwrap();
    let fgraph = FunctionGraph::new([a], [q, r]).unwrap();

    let tree = fgraph.tree().unwrap();
    println!("Graph tree:\n{tree}");
    assert!(tree.starts_with("FunctionGraph (2 outputs)"));
    assert!(tree.contains("qr.0"));
    // The second output reaches the same node.
    assert!(tree.contains("see above"));
}
