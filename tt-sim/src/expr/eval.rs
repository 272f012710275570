//! Evaluation of expression graphs.

use num_complex::Complex64;

use super::{apply_binary, apply_unary, ExprGraph, ExprId, Node, Part, VarId};
use crate::complex;

/// Variable assignment plus a value cache keyed by node id.
///
/// The context is owned by whoever drives the evaluation (one optimizer run)
/// and is never shared. Setting a variable drops exactly the cached values
/// that depend on it, so re-evaluating after changing only the time variable
/// reuses everything computed from the other variables.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    values: Vec<f64>,
    cache: Vec<f64>,
    valid: Vec<bool>,
}

impl EvalContext {
    pub fn new(graph: &ExprGraph) -> Self {
        let mut ctx = Self::default();
        ctx.sync(graph);
        ctx
    }

    // Graphs grow as derivatives are requested; grow the cache with them.
    fn sync(&mut self, graph: &ExprGraph) {
        if self.values.len() < graph.var_count() {
            self.values.resize(graph.var_count(), 0.0);
        }
        if self.cache.len() < graph.len() {
            self.cache.resize(graph.len(), 0.0);
            self.valid.resize(graph.len(), false);
        }
    }

    /// Assigns a variable, invalidating every cached node that reads it.
    pub fn set(&mut self, graph: &ExprGraph, var: VarId, value: f64) {
        self.sync(graph);
        let slot = &mut self.values[var.index()];
        if slot.to_bits() == value.to_bits() {
            return;
        }
        *slot = value;
        let bit = var.bit();
        for (index, valid) in self.valid.iter_mut().enumerate() {
            if *valid && graph.deps[index] & bit != 0 {
                *valid = false;
            }
        }
    }

    pub fn get(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    /// Drops every cached value, keeping the variable assignment.
    pub fn clear(&mut self) {
        self.valid.iter_mut().for_each(|v| *v = false);
    }

    pub fn eval(&mut self, graph: &ExprGraph, id: ExprId) -> f64 {
        self.sync(graph);
        self.eval_node(graph, id)
    }

    fn eval_node(&mut self, graph: &ExprGraph, id: ExprId) -> f64 {
        let index = id.index();
        if self.valid[index] {
            return self.cache[index];
        }
        let value = match graph.node(id) {
            Node::Const(value) => value,
            Node::Var(var) => self.values[var.index()],
            Node::Unary(op, a) => apply_unary(op, self.eval_node(graph, a)),
            Node::Binary(op, a, b) => {
                let a = self.eval_node(graph, a);
                let b = self.eval_node(graph, b);
                apply_binary(op, a, b)
            }
            Node::Select {
                lhs,
                rhs,
                if_le,
                otherwise,
            } => {
                if self.eval_node(graph, lhs) <= self.eval_node(graph, rhs) {
                    self.eval_node(graph, if_le)
                } else {
                    self.eval_node(graph, otherwise)
                }
            }
            Node::Coalesce {
                guard,
                primary,
                fallback,
            } => {
                if self.eval_node(graph, guard).is_finite() {
                    self.eval_node(graph, primary)
                } else {
                    self.eval_node(graph, fallback)
                }
            }
            Node::ExpIntegral { part, re, im } => {
                let z = Complex64::new(self.eval_node(graph, re), self.eval_node(graph, im));
                let ei = complex::ei(z);
                match part {
                    Part::Re => ei.re,
                    Part::Im => ei.im,
                }
            }
            Node::Lookup { table, arg, slope } => {
                let x = self.eval_node(graph, arg);
                let table = graph.table(table);
                if slope {
                    table.slope(x)
                } else {
                    table.value(x)
                }
            }
        };
        self.cache[index] = value;
        self.valid[index] = true;
        value
    }
}
