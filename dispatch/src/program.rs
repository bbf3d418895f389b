//! Lowered graphs.
//!
//! A [`Program`] is a graph whose nodes have all been resolved to callables,
//! laid out as steps over numbered value slots.

use std::collections::HashMap;
use std::fmt;

use snafu::{OptionExt, ResultExt, ensure};
use tessera_ir::error::VariableNotInGraphSnafu;
use tessera_ir::{Arity, FunctionGraph, Variable};
use tracing::trace;

use crate::config::DispatchContext;
use crate::error::*;
use crate::registry::DispatchRegistry;
use crate::value::{Callable, Value};

struct Step {
    op: String,
    callable: Callable,
    args: Vec<usize>,
    outs: Vec<usize>,
}

/// Resolved graph mapping input values to output values.
pub struct Program {
    nslots: usize,
    inputs: Vec<usize>,
    constants: Vec<(usize, Value)>,
    steps: Vec<Step>,
    outputs: Vec<usize>,
}

/// Slot assignment while lowering.
#[derive(Default)]
struct Slots {
    by_variable: HashMap<u64, usize>,
    constants: Vec<(usize, Value)>,
    next: usize,
}

impl Slots {
    fn define(&mut self, var: &Variable) -> usize {
        let slot = self.next;
        self.next += 1;
        self.by_variable.insert(var.id(), slot);
        slot
    }

    /// Slot holding `var`; constants get one on first use.
    fn lookup(&mut self, var: &Variable) -> Result<usize> {
        if let Some(&slot) = self.by_variable.get(&var.id()) {
            return Ok(slot);
        }
        let constant =
            var.as_constant().with_context(|| VariableNotInGraphSnafu { var: var.label() }).context(GraphSnafu)?;
        let slot = self.define(var);
        self.constants.push((slot, Value::Array(constant.value().clone())));
        Ok(slot)
    }
}

impl Program {
    pub(crate) fn lower(registry: &DispatchRegistry, fgraph: &FunctionGraph, ctx: &DispatchContext) -> Result<Self> {
        let nodes = fgraph.toposort().context(GraphSnafu)?;
        let mut slots = Slots::default();
        let inputs: Vec<usize> = fgraph.inputs().iter().map(|var| slots.define(var)).collect();

        let mut steps = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let callable = registry.resolve(node, ctx)?;
            let args = node.inputs().iter().map(|var| slots.lookup(var)).collect::<Result<Vec<_>>>()?;
            let outs = node.outputs().iter().map(|var| slots.define(var)).collect();
            steps.push(Step { op: node.op().name().into_owned(), callable, args, outs });
        }
        let outputs = fgraph.outputs().iter().map(|var| slots.lookup(var)).collect::<Result<Vec<_>>>()?;

        Ok(Self { nslots: slots.next, inputs, constants: slots.constants, steps, outputs })
    }

    pub fn nin(&self) -> usize {
        self.inputs.len()
    }

    pub fn nout(&self) -> usize {
        self.outputs.len()
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Operator names of the steps in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.op.as_str())
    }

    /// Run every step and return the output values.
    pub fn run(&self, args: &[Value]) -> Result<Vec<Value>> {
        ensure!(
            args.len() == self.nin(),
            ArityViolationSnafu { op: "program", expected: Arity::Fixed(self.nin()), got: args.len() }
        );
        let mut values: Vec<Option<Value>> = vec![None; self.nslots];
        for (&slot, arg) in self.inputs.iter().zip(args) {
            values[slot] = Some(arg.clone());
        }
        for (slot, constant) in &self.constants {
            values[*slot] = Some(constant.clone());
        }

        for step in &self.steps {
            let operands = step.args.iter().map(|&slot| read(&values, slot)).collect::<Result<Vec<_>>>()?;
            trace!(op = %step.op, "running step");
            let result = (step.callable)(&operands)?;
            for (&slot, value) in step.outs.iter().zip(result.split(step.outs.len())?) {
                values[slot] = Some(value);
            }
        }
        self.outputs.iter().map(|&slot| read(&values, slot)).collect()
    }
}

fn read(values: &[Option<Value>], slot: usize) -> Result<Value> {
    values
        .get(slot)
        .cloned()
        .flatten()
        .with_context(|| ValueKindSnafu { expected: "computed value", got: format!("empty slot {slot}") })
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("inputs", &self.inputs.len())
            .field("constants", &self.constants.len())
            .field("steps", &self.steps.iter().map(|s| s.op.as_str()).collect::<Vec<_>>())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
