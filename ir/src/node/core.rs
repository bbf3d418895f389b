use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tessera_dtype::{DType, TensorType};

use crate::error::Result;
use crate::node::Constant;
use crate::op::Op;

// Monotonic id source shared by variables and apply nodes. Ids are never
// reused; an apply node reserves one id for itself plus one per output.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn reserve_ids(count: u64) -> u64 {
    NEXT_ID.fetch_add(count, Ordering::Relaxed)
}

/// What a variable stands for.
#[derive(Clone)]
pub enum VariableKind {
    /// Free graph input, bound when the compiled function is called.
    Input,
    Constant(Constant),
    /// Output `index` of `owner`.
    Output { owner: Arc<Apply>, index: usize },
}

struct VariableData {
    id: u64,
    ty: TensorType,
    name: Option<String>,
    kind: VariableKind,
}

/// Typed value placeholder in an expression graph.
///
/// Cheap to clone. Equality and hashing use the stable id.
#[derive(Clone)]
pub struct Variable(Arc<VariableData>);

impl Variable {
    /// Free input variable.
    pub fn input(name: impl Into<String>, ty: TensorType) -> Self {
        Self(Arc::new(VariableData { id: reserve_ids(1), ty, name: Some(name.into()), kind: VariableKind::Input }))
    }

    /// Rank-0 input.
    pub fn scalar(name: impl Into<String>, dtype: DType) -> Self {
        Self::input(name, TensorType::scalar(dtype))
    }

    pub fn vector(name: impl Into<String>, dtype: DType) -> Self {
        Self::input(name, TensorType::vector(dtype))
    }

    pub fn matrix(name: impl Into<String>, dtype: DType) -> Self {
        Self::input(name, TensorType::matrix(dtype))
    }

    pub fn constant(value: Constant) -> Self {
        Self(Arc::new(VariableData {
            id: reserve_ids(1),
            ty: value.ty(),
            name: None,
            kind: VariableKind::Constant(value),
        }))
    }

    /// Rank-0 constant.
    pub fn scalar_constant(dtype: DType, value: f64) -> Self {
        Self::constant(Constant::scalar(dtype, value))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn ty(&self) -> &TensorType {
        &self.0.ty
    }

    pub fn dtype(&self) -> DType {
        self.0.ty.dtype
    }

    pub fn ndim(&self) -> usize {
        self.0.ty.ndim()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn kind(&self) -> &VariableKind {
        &self.0.kind
    }

    pub fn owner(&self) -> Option<&Arc<Apply>> {
        match &self.0.kind {
            VariableKind::Output { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Output index within the owner node.
    pub fn index(&self) -> Option<usize> {
        match &self.0.kind {
            VariableKind::Output { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.0.kind {
            VariableKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Value of a constant whose elements are all equal.
    pub fn constant_scalar(&self) -> Option<f64> {
        self.as_constant()?.unique_value()
    }

    pub fn is_input(&self) -> bool {
        matches!(self.0.kind, VariableKind::Input)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.0.kind, VariableKind::Constant(_))
    }

    /// Name if present, otherwise a label derived from the id.
    pub fn label(&self) -> String {
        match &self.0.name {
            Some(name) => name.clone(),
            None => format!("v{}", self.0.id),
        }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            VariableKind::Input => write!(f, "Input({}: {})", self.label(), self.0.ty),
            VariableKind::Constant(c) => write!(f, "Constant(id={}, {c})", self.0.id),
            VariableKind::Output { owner, index } => {
                write!(f, "Output(id={}, owner={}[{}], {index}: {})", self.0.id, owner.op, owner.id, self.0.ty)
            }
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One operator applied to an ordered list of inputs.
///
/// Immutable: replacing an input means building a new node.
pub struct Apply {
    id: u64,
    op: Op,
    inputs: SmallVec<[Variable; 4]>,
    output_types: SmallVec<[TensorType; 2]>,
}

impl Apply {
    /// Build a node, inferring and checking output types.
    pub fn new(op: impl Into<Op>, inputs: impl IntoIterator<Item = Variable>) -> Result<Arc<Self>> {
        let op = op.into();
        let inputs: SmallVec<[Variable; 4]> = inputs.into_iter().collect();
        let types: SmallVec<[TensorType; 4]> = inputs.iter().map(|v| v.ty().clone()).collect();
        let output_types = op.infer_types(&types)?;
        let id = reserve_ids(1 + output_types.len() as u64);
        Ok(Arc::new(Self { id, op, inputs, output_types }))
    }

    /// Same operator over different inputs.
    pub fn with_inputs(&self, inputs: impl IntoIterator<Item = Variable>) -> Result<Arc<Self>> {
        Self::new(self.op.clone(), inputs)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn output_types(&self) -> &[TensorType] {
        &self.output_types
    }

    pub fn nout(&self) -> usize {
        self.output_types.len()
    }

    /// Output variable at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.nout()`.
    pub fn output(self: &Arc<Self>, index: usize) -> Variable {
        let ty = self.output_types[index].clone();
        Variable(Arc::new(VariableData {
            id: self.id + 1 + index as u64,
            ty,
            name: None,
            kind: VariableKind::Output { owner: self.clone(), index },
        }))
    }

    pub fn outputs(self: &Arc<Self>) -> SmallVec<[Variable; 2]> {
        (0..self.nout()).map(|i| self.output(i)).collect()
    }

    /// Whether every input is a constant.
    pub fn has_constant_inputs(&self) -> bool {
        self.inputs.iter().all(Variable::is_constant)
    }
}

impl fmt::Debug for Apply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: SmallVec<[u64; 4]> = self.inputs.iter().map(Variable::id).collect();
        write!(f, "Apply(id={}, op={}, inputs={:?})", self.id, self.op, inputs.as_slice())
    }
}
