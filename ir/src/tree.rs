//! ASCII tree rendering of expression graphs.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::rc::Rc;

use ptree::{Style, TreeItem};

use crate::error::*;
use crate::graph::FunctionGraph;
use crate::node::{Variable, VariableKind};

/// Tree item for one variable. Nodes shared between several consumers are
/// expanded once and shown as `[id] → (see above)` afterwards.
#[derive(Clone)]
struct VariableTree {
    var: Variable,
    visited: Rc<RefCell<HashSet<u64>>>,
    is_backref: RefCell<bool>,
}

impl VariableTree {
    fn new(var: Variable, visited: Rc<RefCell<HashSet<u64>>>) -> Self {
        Self { var, visited, is_backref: RefCell::new(false) }
    }
}

impl TreeItem for VariableTree {
    type Child = VariableTree;

    fn write_self<W: io::Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        let Some(owner) = self.var.owner() else {
            return write!(f, "{}", format_leaf(&self.var));
        };
        let mut visited = self.visited.borrow_mut();
        if !visited.insert(owner.id()) {
            *self.is_backref.borrow_mut() = true;
            return write!(f, "[{}] → (see above)", owner.id());
        }
        let output = if owner.nout() > 1 { format!(".{}", self.var.index().unwrap_or(0)) } else { String::new() };
        write!(f, "[{}] {}{} : {}", owner.id(), owner.op(), output, self.var.ty())
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        if *self.is_backref.borrow() {
            return Cow::Borrowed(&[]);
        }
        match self.var.owner() {
            Some(owner) => {
                Cow::Owned(owner.inputs().iter().map(|v| VariableTree::new(v.clone(), self.visited.clone())).collect())
            }
            None => Cow::Borrowed(&[]),
        }
    }
}

fn format_leaf(var: &Variable) -> String {
    match var.kind() {
        VariableKind::Constant(c) => format!("CONST {c}"),
        _ => format!("{} : {}", var.label(), var.ty()),
    }
}

/// Root item listing the declared outputs.
#[derive(Clone)]
struct GraphTree {
    outputs: Vec<VariableTree>,
}

impl TreeItem for GraphTree {
    type Child = VariableTree;

    fn write_self<W: io::Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        write!(f, "FunctionGraph ({} outputs)", self.outputs.len())
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.outputs)
    }
}

fn write_item(item: &impl TreeItem) -> Result<String> {
    let mut buf = Vec::new();
    if let Err(e) = ptree::write_tree(item, &mut buf) {
        return RenderSnafu { message: e.to_string() }.fail();
    }
    String::from_utf8(buf).map_err(|e| Error::Render { message: e.to_string() })
}

impl Variable {
    /// Render the expression computing this variable.
    pub fn tree(&self) -> Result<String> {
        write_item(&VariableTree::new(self.clone(), Rc::default()))
    }
}

impl FunctionGraph {
    /// Render the graph's outputs as an ASCII tree.
    pub fn tree(&self) -> Result<String> {
        let visited: Rc<RefCell<HashSet<u64>>> = Rc::default();
        let outputs = self.outputs().iter().map(|v| VariableTree::new(v.clone(), Rc::clone(&visited))).collect();
        write_item(&GraphTree { outputs })
    }
}
