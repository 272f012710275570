//! Symbolic differentiation.
//!
//! `derivative(f, x)` builds a new expression for ∂f/∂x inside the same graph.
//! Results are memoised per `(node, variable)`, and nodes that do not depend
//! on the variable differentiate to the shared zero constant without
//! allocating anything.

use super::{BinaryOp, ExprGraph, ExprId, Node, Part, UnaryOp, VarId};

impl ExprGraph {
    /// Exact first derivative of `id` with respect to `var`.
    pub fn derivative(&mut self, id: ExprId, var: VarId) -> ExprId {
        if !self.depends_on(id, var) {
            return self.zero;
        }
        if let Some(&known) = self.derivatives.get(&(id, var)) {
            return known;
        }
        let result = self.derive_node(id, var);
        self.derivatives.insert((id, var), result);
        result
    }

    fn derive_node(&mut self, id: ExprId, var: VarId) -> ExprId {
        use BinaryOp::*;

        match self.node(id) {
            Node::Const(_) => self.zero,
            Node::Var(v) => {
                if v == var {
                    self.one
                } else {
                    self.zero
                }
            }
            Node::Unary(op, a) => {
                let da = self.derivative(a, var);
                match op {
                    UnaryOp::Neg => self.unary(UnaryOp::Neg, da),
                    // d sqrt(a) = da / (2 sqrt(a))
                    UnaryOp::Sqrt => {
                        let two = self.constant(2.0);
                        let denom = self.binary(Mul, two, id);
                        self.binary(Div, da, denom)
                    }
                    UnaryOp::Ln => self.binary(Div, da, a),
                    UnaryOp::Ln1p => {
                        let one = self.one;
                        let denom = self.binary(Add, one, a);
                        self.binary(Div, da, denom)
                    }
                    UnaryOp::Exp => self.binary(Mul, id, da),
                    UnaryOp::Sin => {
                        let cos = self.unary(UnaryOp::Cos, a);
                        self.binary(Mul, cos, da)
                    }
                    UnaryOp::Cos => {
                        let sin = self.unary(UnaryOp::Sin, a);
                        let neg = self.unary(UnaryOp::Neg, sin);
                        self.binary(Mul, neg, da)
                    }
                }
            }
            Node::Binary(op, a, b) => {
                let da = self.derivative(a, var);
                let db = self.derivative(b, var);
                match op {
                    Add => self.binary(Add, da, db),
                    Sub => self.binary(Sub, da, db),
                    Mul => {
                        let left = self.chain(da, b);
                        let right = self.chain(db, a);
                        self.binary(Add, left, right)
                    }
                    // d(a/b) = (da - (a/b)·db) / b
                    Div => {
                        let scaled = self.chain(db, id);
                        let numer = self.binary(Sub, da, scaled);
                        self.binary(Div, numer, b)
                    }
                }
            }
            Node::Select {
                lhs,
                rhs,
                if_le,
                otherwise,
            } => {
                let d_le = self.derivative(if_le, var);
                let d_other = self.derivative(otherwise, var);
                self.select(lhs, rhs, d_le, d_other)
            }
            Node::Coalesce {
                guard,
                primary,
                fallback,
            } => {
                let d_primary = self.derivative(primary, var);
                let d_fallback = self.derivative(fallback, var);
                self.coalesce(guard, d_primary, d_fallback)
            }
            Node::ExpIntegral { part, re, im } => self.derive_exp_integral(part, re, im, var),
            Node::Lookup { table, arg, slope } => {
                if slope {
                    // piecewise constant
                    return self.zero;
                }
                let darg = self.derivative(arg, var);
                let rate = self.lookup_node(table, arg, true);
                self.binary(Mul, rate, darg)
            }
        }
    }

    // `factor · d`, dropping the term when `d` is the structural zero of an
    // operand that does not depend on the variable
    fn chain(&mut self, d: ExprId, factor: ExprId) -> ExprId {
        if d == self.zero {
            return self.zero;
        }
        self.binary(BinaryOp::Mul, factor, d)
    }

    // d Ei(z) = e^z / z · dz, split into real and imaginary parts
    fn derive_exp_integral(&mut self, part: Part, re: ExprId, im: ExprId, var: VarId) -> ExprId {
        use BinaryOp::*;

        let dx = self.derivative(re, var);
        let dy = self.derivative(im, var);

        let ex = self.unary(UnaryOp::Exp, re);
        let cos = self.unary(UnaryOp::Cos, im);
        let sin = self.unary(UnaryOp::Sin, im);
        let cr = self.binary(Mul, ex, cos);
        let ci = self.binary(Mul, ex, sin);

        let xx = self.binary(Mul, re, re);
        let yy = self.binary(Mul, im, im);
        let den = self.binary(Add, xx, yy);

        let crx = self.binary(Mul, cr, re);
        let ciy = self.binary(Mul, ci, im);
        let cix = self.binary(Mul, ci, re);
        let cry = self.binary(Mul, cr, im);
        let pr_num = self.binary(Add, crx, ciy);
        let pi_num = self.binary(Sub, cix, cry);
        let pr = self.binary(Div, pr_num, den);
        let pi = self.binary(Div, pi_num, den);

        match part {
            Part::Re => {
                let a = self.chain(dx, pr);
                let b = self.chain(dy, pi);
                self.binary(Sub, a, b)
            }
            Part::Im => {
                let a = self.chain(dy, pr);
                let b = self.chain(dx, pi);
                self.binary(Add, a, b)
            }
        }
    }
}
