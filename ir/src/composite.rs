//! Composite scalar operators: a fused sub-graph used as a single operator.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::DType;

use crate::error::*;
use crate::graph::FunctionGraph;
use crate::node::Variable;
use crate::op::Op;
use crate::scalar::ScalarOp;

/// Scalar operator defined by an inner graph of elementwise nodes over rank-0
/// inputs.
///
/// Compared and hashed by identity: two composites are equal only when they
/// share the same inner graph.
pub struct Composite {
    name: String,
    fgraph: FunctionGraph,
    input_dtypes: SmallVec<[DType; 4]>,
    output_dtypes: SmallVec<[DType; 2]>,
}

impl Composite {
    /// Build from rank-0 `inputs` and the `outputs` computed from them.
    pub fn new(inputs: Vec<Variable>, outputs: Vec<Variable>) -> Result<Arc<Self>> {
        Self::from_graph(FunctionGraph::new(inputs, outputs)?)
    }

    pub fn from_graph(fgraph: FunctionGraph) -> Result<Arc<Self>> {
        ensure!(!fgraph.outputs().is_empty(), InvalidCompositeSnafu { reason: "no outputs" });

        let nodes = fgraph.toposort()?;
        for node in &nodes {
            ensure!(
                matches!(node.op(), Op::Elemwise(_)),
                InvalidCompositeSnafu { reason: format!("inner node {} is not elementwise", node.op()) }
            );
        }
        for var in fgraph.variables() {
            ensure!(
                var.ty().is_scalar(),
                InvalidCompositeSnafu { reason: format!("inner variable {var} has non-scalar type {}", var.ty()) }
            );
        }

        let name = format!("composite{{{}}}", nodes.iter().map(|n| n.op().name()).join(","));
        let input_dtypes = fgraph.inputs().iter().map(Variable::dtype).collect();
        let output_dtypes = fgraph.outputs().iter().map(Variable::dtype).collect();
        Ok(Arc::new(Self { name, fgraph, input_dtypes, output_dtypes }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fgraph(&self) -> &FunctionGraph {
        &self.fgraph
    }

    pub fn nin(&self) -> usize {
        self.input_dtypes.len()
    }

    pub fn nout(&self) -> usize {
        self.output_dtypes.len()
    }

    pub fn input_dtypes(&self) -> &[DType] {
        &self.input_dtypes
    }

    pub fn output_dtypes(&self) -> &[DType] {
        &self.output_dtypes
    }

    /// Nesting depth: 1 plus the deepest composite used inside.
    pub fn depth(&self) -> usize {
        1 + self
            .fgraph
            .apply_nodes()
            .iter()
            .filter_map(|n| match n.op().scalar_op() {
                Some(ScalarOp::Composite(inner)) => Some(inner.depth()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Evaluate the inner graph on scalars.
    pub fn perform(&self, inputs: &[f64]) -> Option<SmallVec<[f64; 2]>> {
        if inputs.len() != self.nin() {
            return None;
        }
        let lookup =
            |values: &HashMap<Variable, f64>, v: &Variable| values.get(v).copied().or_else(|| v.constant_scalar());

        let mut values: HashMap<Variable, f64> =
            self.fgraph.inputs().iter().cloned().zip(inputs.iter().copied()).collect();
        for node in self.fgraph.toposort().ok()? {
            let args: SmallVec<[f64; 4]> = node.inputs().iter().map(|v| lookup(&values, v)).collect::<Option<_>>()?;
            let out_dtypes: SmallVec<[DType; 2]> = node.output_types().iter().map(|t| t.dtype).collect();
            let results = node.op().scalar_op()?.perform(&args, &out_dtypes)?;
            values.extend(node.outputs().into_iter().zip(results));
        }

        self.fgraph.outputs().iter().map(|v| lookup(&values, v)).collect()
    }
}

impl PartialEq for Composite {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Composite {}

impl Hash for Composite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Composite({}, nin={}, nout={})", self.name, self.nin(), self.nout())
    }
}
