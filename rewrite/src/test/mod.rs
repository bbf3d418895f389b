//! Shared helpers for rewrite tests.

use std::collections::HashMap;

use ndarray::{ArrayD, IxDyn};
use tessera_ir::{FunctionGraph, Variable};

mod property;
mod unit;

fn lookup(values: &HashMap<u64, ArrayD<f64>>, var: &Variable) -> ArrayD<f64> {
    match var.as_constant() {
        Some(constant) => constant.value().clone(),
        None => values[&var.id()].clone(),
    }
}

/// Values of every input and node output of `fgraph`.
///
/// Panics on operators without a reference implementation.
fn evaluate_all(fgraph: &FunctionGraph, inputs: &[ArrayD<f64>]) -> HashMap<u64, ArrayD<f64>> {
    let mut values: HashMap<u64, ArrayD<f64>> =
        fgraph.inputs().iter().zip(inputs).map(|(var, value)| (var.id(), value.clone())).collect();

    for node in fgraph.toposort().unwrap() {
        let args: Vec<ArrayD<f64>> = node.inputs().iter().map(|v| lookup(&values, v)).collect();
        let refs: Vec<&ArrayD<f64>> = args.iter().collect();
        let outputs = node.op().perform(&refs, node.output_types()).expect("reference evaluation");
        for (var, value) in node.outputs().into_iter().zip(outputs) {
            values.insert(var.id(), value);
        }
    }
    values
}

/// Reference evaluation of `fgraph` on concrete inputs.
pub(crate) fn evaluate(fgraph: &FunctionGraph, inputs: &[ArrayD<f64>]) -> Vec<ArrayD<f64>> {
    let values = evaluate_all(fgraph, inputs);
    fgraph.outputs().iter().map(|v| lookup(&values, v)).collect()
}

fn scalars(inputs: &[f64]) -> Vec<ArrayD<f64>> {
    inputs.iter().map(|&v| ArrayD::from_elem(IxDyn(&[]), v)).collect()
}

/// Largest magnitude of any intermediate value; infinite when one is NaN.
pub(crate) fn max_magnitude(fgraph: &FunctionGraph, inputs: &[f64]) -> f64 {
    evaluate_all(fgraph, &scalars(inputs))
        .values()
        .flat_map(|a| a.iter().copied())
        .map(|v| if v.is_nan() { f64::INFINITY } else { v.abs() })
        .fold(0.0, f64::max)
}

/// Evaluate a graph of scalar inputs and outputs.
pub(crate) fn evaluate_scalars(fgraph: &FunctionGraph, inputs: &[f64]) -> Vec<f64> {
    evaluate(fgraph, &scalars(inputs)).into_iter().map(|a| a.iter().copied().next().unwrap()).collect()
}
