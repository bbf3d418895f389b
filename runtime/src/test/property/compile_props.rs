use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;
use tessera_dispatch::Value;
use tessera_dtype::DType;
use tessera_ir::test::property::generators::{Expr, arb_expr, arb_input_values};
use tessera_ir::{FunctionGraph, Variable};
use tessera_rewrite::RewriteQuery;

use crate::mode::{Mode, evaluate};
use crate::test::{close, numbers};

const NINPUTS: usize = 3;

fn inputs(vector: bool) -> Vec<Variable> {
    (0..NINPUTS)
        .map(|i| {
            let name = format!("x{i}");
            if vector { Variable::vector(name, DType::Float64) } else { Variable::scalar(name, DType::Float64) }
        })
        .collect()
}

fn scalars(values: &[f64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Scalar(v)).collect()
}

/// Largest magnitude of any intermediate value, computed without rewrites.
fn max_magnitude(expr: &Expr, values: &[f64]) -> f64 {
    let xs = inputs(false);
    let out = expr.build(&xs).unwrap();
    let fgraph = FunctionGraph::new(xs.clone(), [out]).unwrap();
    let intermediates: Vec<Variable> = fgraph.apply_nodes().iter().flat_map(|node| node.outputs()).collect();
    if intermediates.is_empty() {
        return values.iter().fold(0.0, |m, v| m.max(v.abs()));
    }
    let plain = Mode::array().with_query(RewriteQuery::new());
    evaluate(&xs, &intermediates, &scalars(values), &plain)
        .unwrap()
        .iter()
        .flat_map(numbers)
        .map(|v| if v.is_nan() { f64::INFINITY } else { v.abs() })
        .fold(0.0, f64::max)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Compiling under the array mode does not change well-conditioned results.
    #[test]
    fn compiled_matches_reference(expr in arb_expr(NINPUTS), values in arb_input_values(NINPUTS)) {
        prop_assume!(max_magnitude(&expr, &values) < 1e3);
        let xs = inputs(false);
        let out = expr.build(&xs).unwrap();

        let outputs = evaluate(&xs, &[out], &scalars(&values), &Mode::array()).unwrap();
        let (actual, expected) = (numbers(&outputs[0])[0], expr.eval(&values));
        prop_assert!(close(actual, expected, 1e-6), "{actual} vs {expected}");
    }

    /// A compiled vector graph computes each element as the scalar graph would.
    #[test]
    fn vector_graph_is_elementwise(
        expr in arb_expr(NINPUTS),
        rows in prop::collection::vec(arb_input_values(NINPUTS), 1..4),
    ) {
        let xs = inputs(true);
        let out = expr.build(&xs).unwrap();
        let columns: Vec<Value> = (0..NINPUTS)
            .map(|i| {
                let column = rows.iter().map(|r| r[i]).collect();
                Value::Array(ArrayD::from_shape_vec(IxDyn(&[rows.len()]), column).unwrap())
            })
            .collect();

        let outputs = evaluate(&xs, &[out], &columns, &Mode::array()).unwrap();
        let actual = numbers(&outputs[0]);
        for (i, row) in rows.iter().enumerate() {
            prop_assume!(max_magnitude(&expr, row) < 1e3);
            // Constant expressions stay rank 0.
            let got = actual.get(i).copied().unwrap_or(actual[0]);
            prop_assert!(close(got, expr.eval(row), 1e-6), "{actual:?} at row {i}");
        }
    }
}
