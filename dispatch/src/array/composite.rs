//! Composite lowering.
//!
//! The inner graph is lowered through the same registry one nesting level
//! deeper. With vectorization enabled the resulting callable broadcasts its
//! arguments and runs the inner program once per element.

use std::sync::Arc;

use ndarray::{ArrayD, Dimension, IxDyn};
use snafu::{OptionExt, ensure};
use tessera_ir::{Apply, ScalarOp};
use tracing::debug;

use crate::config::DispatchContext;
use crate::error::*;
use crate::program::Program;
use crate::registry::DispatchRegistry;
use crate::value::{Callable, Value, broadcast_arrays};

pub(crate) fn composite(node: &Apply, registry: &DispatchRegistry, ctx: &DispatchContext) -> Result<Option<Callable>> {
    let Some(ScalarOp::Composite(composite)) = node.op().scalar_op() else { return Ok(None) };

    let inner = ctx.nested();
    ensure!(inner.depth <= ctx.limit(), CompositeDepthExceededSnafu { depth: inner.depth, limit: ctx.limit() });
    let program = Arc::new(registry.lower_graph(composite.fgraph(), &inner)?);
    debug!(composite = composite.name(), depth = inner.depth, steps = program.num_steps(), "lowered composite");

    if !ctx.vectorize {
        return Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> { Ok(pack(program.run(args)?)) })));
    }
    let name = composite.name().to_string();
    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> { per_element(&name, &program, args) })))
}

/// Single outputs unwrap; several become a tuple.
fn pack(values: Vec<Value>) -> Value {
    match <[Value; 1]>::try_from(values) {
        Ok([value]) => value,
        Err(values) => Value::Tuple(values),
    }
}

fn per_element(name: &str, program: &Program, args: &[Value]) -> Result<Value> {
    let arrays = args.iter().map(Value::to_array).collect::<Result<Vec<_>>>()?;
    let (shape, views) = broadcast_arrays(name, &arrays)?;
    let size: usize = shape.iter().product();

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(size); program.nout()];
    let mut element: Vec<Value> = Vec::with_capacity(views.len());
    for index in ndarray::indices(IxDyn(&shape)) {
        element.clear();
        element.extend(views.iter().map(|view| Value::Scalar(view[index.slice()])));
        for (column, value) in columns.iter_mut().zip(program.run(&element)?) {
            let scalar = value.as_scalar().with_context(|| ValueKindSnafu { expected: "scalar", got: value.kind() })?;
            column.push(scalar);
        }
    }

    let outputs = columns
        .into_iter()
        .map(|column| {
            ArrayD::from_shape_vec(IxDyn(&shape), column)
                .ok()
                .map(Value::Array)
                .with_context(|| ShapeMismatchSnafu { op: name, shapes: vec![shape.clone()] })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(pack(outputs))
}
