//! Symbolic expression graph with exact first derivatives.
//!
//! Expressions live in an arena ([`ExprGraph`]) and are addressed by
//! [`ExprId`]. Operands always refer to earlier nodes, so the graph is a DAG
//! built bottom-up. Shared subexpressions are simply reused ids.
//!
//! ```text
//!   x ──┐
//!       ├─ Mul ── Exp ──┐
//!   t ──┘               ├─ Add ── result
//!   y ──────────────────┘
//! ```
//!
//! Each node records the set of variables it depends on. Two things use it:
//! [`ExprGraph::derivative`] short-circuits to zero for independent nodes,
//! and [`EvalContext`] only invalidates cached values that actually depend on
//! a variable that changed.
//!
//! The operator set is closed and small: exactly what the closed-form ball
//! flight and the bat impulse need.

mod derive;
mod eval;

pub use eval::EvalContext;

use std::collections::HashMap;

// =============================================================================
// Identifiers
// =============================================================================

/// Handle to a node in an [`ExprGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a free variable of an [`ExprGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Dependency bit. Variables past 64 share the top bit, which only makes
    /// invalidation and zero-derivative detection more conservative.
    fn bit(self) -> u64 {
        1u64 << self.0.min(63)
    }
}

/// Handle to a point table used by [`Node::Lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(u32);

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Ln,
    Ln1p,
    Exp,
    Sin,
    Cos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Component of a complex-valued node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Re,
    Im,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Const(f64),
    Var(VarId),
    Unary(UnaryOp, ExprId),
    Binary(BinaryOp, ExprId, ExprId),
    /// `if lhs <= rhs { if_le } else { otherwise }`; min and max are built on it.
    Select {
        lhs: ExprId,
        rhs: ExprId,
        if_le: ExprId,
        otherwise: ExprId,
    },
    /// `primary` while `guard` evaluates to a finite value, `fallback` otherwise.
    Coalesce {
        guard: ExprId,
        primary: ExprId,
        fallback: ExprId,
    },
    /// One part of the complex exponential integral `Ei(re + i·im)`.
    ExpIntegral { part: Part, re: ExprId, im: ExprId },
    /// Piecewise-linear function through a point table, or its slope.
    Lookup {
        table: TableId,
        arg: ExprId,
        slope: bool,
    },
}

// =============================================================================
// Point tables ("function by points")
// =============================================================================

/// Piecewise-linear function through sampled points, held constant past both
/// ends.
#[derive(Debug, Clone, PartialEq)]
pub struct PointTable {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl PointTable {
    /// Builds a table from strictly increasing abscissae.
    ///
    /// Returns `None` for empty input, mismatched lengths, or unsorted `xs`.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Option<Self> {
        if xs.is_empty() || xs.len() != ys.len() || xs.windows(2).any(|w| w[1] <= w[0]) {
            return None;
        }
        Some(Self { xs, ys })
    }

    // Index of the segment [xs[i], xs[i+1]] containing x
    fn segment(&self, x: f64) -> Option<usize> {
        let last = self.xs.len() - 1;
        if last == 0 || !(x >= self.xs[0] && x < self.xs[last]) {
            return None;
        }
        Some(self.xs.partition_point(|&k| k <= x) - 1)
    }

    pub fn value(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        match self.segment(x) {
            Some(i) => {
                let w = (x - self.xs[i]) / (self.xs[i + 1] - self.xs[i]);
                self.ys[i] + (self.ys[i + 1] - self.ys[i]) * w
            }
            None if x < self.xs[0] => self.ys[0],
            None => self.ys[self.ys.len() - 1],
        }
    }

    pub fn slope(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        match self.segment(x) {
            Some(i) => (self.ys[i + 1] - self.ys[i]) / (self.xs[i + 1] - self.xs[i]),
            None => 0.0,
        }
    }
}

// =============================================================================
// Graph
// =============================================================================

/// Arena of expression nodes plus their derivative memo.
#[derive(Debug, Clone)]
pub struct ExprGraph {
    nodes: Vec<Node>,
    deps: Vec<u64>,
    var_nodes: Vec<ExprId>,
    var_names: Vec<String>,
    tables: Vec<PointTable>,
    derivatives: HashMap<(ExprId, VarId), ExprId>,
    zero: ExprId,
    one: ExprId,
}

impl Default for ExprGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            deps: Vec::new(),
            var_nodes: Vec::new(),
            var_names: Vec::new(),
            tables: Vec::new(),
            derivatives: HashMap::new(),
            zero: ExprId(0),
            one: ExprId(0),
        };
        graph.zero = graph.push(Node::Const(0.0), 0);
        graph.one = graph.push(Node::Const(1.0), 0);
        graph
    }

    fn push(&mut self, node: Node, deps: u64) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.deps.push(deps);
        id
    }

    /// Number of nodes, derivative nodes included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ExprId) -> Node {
        self.nodes[id.index()]
    }

    pub(crate) fn deps(&self, id: ExprId) -> u64 {
        self.deps[id.index()]
    }

    pub fn table(&self, id: TableId) -> &PointTable {
        &self.tables[id.0 as usize]
    }

    pub fn var_count(&self) -> usize {
        self.var_nodes.len()
    }

    pub fn var_name(&self, var: VarId) -> &str {
        &self.var_names[var.index()]
    }

    /// Whether `id` can change when `var` does
    pub fn depends_on(&self, id: ExprId, var: VarId) -> bool {
        self.deps(id) & var.bit() != 0
    }

    pub fn const_value(&self, id: ExprId) -> Option<f64> {
        match self.node(id) {
            Node::Const(value) => Some(value),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Leaves
    // -------------------------------------------------------------------------

    pub fn constant(&mut self, value: f64) -> ExprId {
        if value == 0.0 && value.is_sign_positive() {
            return self.zero;
        }
        if value == 1.0 {
            return self.one;
        }
        self.push(Node::Const(value), 0)
    }

    /// Declares a new free variable.
    pub fn variable(&mut self, name: &str) -> VarId {
        let var = VarId(self.var_nodes.len() as u32);
        let node = self.push(Node::Var(var), var.bit());
        self.var_nodes.push(node);
        self.var_names.push(name.to_string());
        var
    }

    /// Expression reading a variable
    pub fn var(&self, var: VarId) -> ExprId {
        self.var_nodes[var.index()]
    }

    pub fn add_table(&mut self, table: PointTable) -> TableId {
        self.tables.push(table);
        TableId((self.tables.len() - 1) as u32)
    }

    // -------------------------------------------------------------------------
    // Operators
    // -------------------------------------------------------------------------

    pub fn unary(&mut self, op: UnaryOp, a: ExprId) -> ExprId {
        if let Some(value) = self.const_value(a) {
            return self.constant(apply_unary(op, value));
        }
        if op == UnaryOp::Neg {
            if let Node::Unary(UnaryOp::Neg, inner) = self.node(a) {
                return inner;
            }
        }
        let deps = self.deps(a);
        self.push(Node::Unary(op, a), deps)
    }

    pub fn binary(&mut self, op: BinaryOp, a: ExprId, b: ExprId) -> ExprId {
        let (ca, cb) = (self.const_value(a), self.const_value(b));
        if let (Some(x), Some(y)) = (ca, cb) {
            return self.constant(apply_binary(op, x, y));
        }
        match op {
            BinaryOp::Add if ca == Some(0.0) => return b,
            BinaryOp::Add | BinaryOp::Sub if cb == Some(0.0) => return a,
            BinaryOp::Sub if ca == Some(0.0) => return self.unary(UnaryOp::Neg, b),
            BinaryOp::Mul if ca == Some(1.0) => return b,
            BinaryOp::Mul | BinaryOp::Div if cb == Some(1.0) => return a,
            _ => {}
        }
        let deps = self.deps(a) | self.deps(b);
        self.push(Node::Binary(op, a, b), deps)
    }

    pub fn select(&mut self, lhs: ExprId, rhs: ExprId, if_le: ExprId, otherwise: ExprId) -> ExprId {
        if if_le == otherwise {
            return if_le;
        }
        if let (Some(l), Some(r)) = (self.const_value(lhs), self.const_value(rhs)) {
            return if l <= r { if_le } else { otherwise };
        }
        let deps = self.deps(lhs) | self.deps(rhs) | self.deps(if_le) | self.deps(otherwise);
        self.push(
            Node::Select {
                lhs,
                rhs,
                if_le,
                otherwise,
            },
            deps,
        )
    }

    pub fn coalesce(&mut self, guard: ExprId, primary: ExprId, fallback: ExprId) -> ExprId {
        if primary == fallback {
            return primary;
        }
        if let Some(value) = self.const_value(guard) {
            return if value.is_finite() { primary } else { fallback };
        }
        let deps = self.deps(guard) | self.deps(primary) | self.deps(fallback);
        self.push(
            Node::Coalesce {
                guard,
                primary,
                fallback,
            },
            deps,
        )
    }

    pub fn exp_integral_part(&mut self, part: Part, re: ExprId, im: ExprId) -> ExprId {
        let deps = self.deps(re) | self.deps(im);
        self.push(Node::ExpIntegral { part, re, im }, deps)
    }

    pub fn lookup(&mut self, table: TableId, arg: ExprId) -> ExprId {
        self.lookup_node(table, arg, false)
    }

    fn lookup_node(&mut self, table: TableId, arg: ExprId, slope: bool) -> ExprId {
        let deps = self.deps(arg);
        self.push(Node::Lookup { table, arg, slope }, deps)
    }
}

pub(crate) fn apply_unary(op: UnaryOp, a: f64) -> f64 {
    match op {
        UnaryOp::Neg => -a,
        UnaryOp::Sqrt => a.sqrt(),
        UnaryOp::Ln => a.ln(),
        UnaryOp::Ln1p => a.ln_1p(),
        UnaryOp::Exp => a.exp(),
        UnaryOp::Sin => a.sin(),
        UnaryOp::Cos => a.cos(),
    }
}

pub(crate) fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let mut g = ExprGraph::new();
        let a = g.constant(2.0);
        let b = g.constant(3.0);
        let sum = g.binary(BinaryOp::Mul, a, b);
        assert_eq!(g.const_value(sum), Some(6.0));
    }

    #[test]
    fn test_identity_simplification() {
        let mut g = ExprGraph::new();
        let x = g.variable("x");
        let xe = g.var(x);
        let zero = g.constant(0.0);
        let one = g.constant(1.0);
        assert_eq!(g.binary(BinaryOp::Add, zero, xe), xe);
        assert_eq!(g.binary(BinaryOp::Mul, xe, one), xe);
        assert_ne!(g.binary(BinaryOp::Mul, zero, xe), zero, "0·x must stay symbolic");
        let neg = g.unary(UnaryOp::Neg, xe);
        assert_eq!(g.unary(UnaryOp::Neg, neg), xe);
    }

    #[test]
    fn test_zero_product_keeps_nan() {
        let mut g = ExprGraph::new();
        let x = g.variable("x");
        let xe = g.var(x);
        let zero = g.constant(0.0);
        let product = g.binary(BinaryOp::Mul, zero, xe);
        let quotient = g.binary(BinaryOp::Div, zero, xe);
        let mut ctx = EvalContext::new(&g);
        ctx.set(&g, x, f64::NAN);
        assert!(ctx.eval(&g, product).is_nan(), "0·NaN must stay NaN");
        ctx.set(&g, x, f64::INFINITY);
        assert!(ctx.eval(&g, product).is_nan(), "0·∞ must be NaN");
        ctx.set(&g, x, 0.0);
        assert!(ctx.eval(&g, quotient).is_nan(), "0/0 must be NaN");
        ctx.set(&g, x, 4.0);
        assert_eq!(ctx.eval(&g, product), 0.0);
    }

    #[test]
    fn test_dependency_tracking() {
        let mut g = ExprGraph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let (xe, ye) = (g.var(x), g.var(y));
        let sx = g.unary(UnaryOp::Sin, xe);
        let prod = g.binary(BinaryOp::Mul, sx, ye);
        assert!(g.depends_on(sx, x));
        assert!(!g.depends_on(sx, y));
        assert!(g.depends_on(prod, x) && g.depends_on(prod, y));
        assert_eq!(g.var_name(y), "y");
    }

    #[test]
    fn test_point_table_interpolation() {
        let table = PointTable::new(vec![0.0, 1.0, 3.0], vec![0.0, 2.0, 1.0]).unwrap();
        assert!((table.value(0.5) - 1.0).abs() < 1e-12);
        assert!((table.value(2.0) - 1.5).abs() < 1e-12);
        assert_eq!(table.value(-1.0), 0.0, "held constant before the first point");
        assert_eq!(table.value(5.0), 1.0, "held constant after the last point");
        assert!((table.slope(2.0) + 0.5).abs() < 1e-12);
        assert_eq!(table.slope(10.0), 0.0);
    }

    #[test]
    fn test_point_table_rejects_unsorted() {
        assert!(PointTable::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_none());
        assert!(PointTable::new(vec![], vec![]).is_none());
        assert!(PointTable::new(vec![0.0, 1.0], vec![1.0]).is_none());
    }
}
