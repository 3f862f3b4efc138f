//! Symbolic differentiation.

use super::simplify;
use crate::ir::ast::{BinaryOp, BroadcastKind, Symbol, SymbolKind};
use crate::ir::error::Result;

fn is_zero(symbol: &Symbol) -> bool {
    matches!(symbol.kind(), SymbolKind::Scalar(v) if *v == 0.0)
}

impl Symbol {
    /// Derivative of this expression with respect to `variable`.
    pub fn diff(&self, variable: &Symbol) -> Result<Symbol> {
        if self == variable {
            return Ok(Symbol::scalar(1.0));
        }
        if !self.has_symbol(variable) {
            return Ok(Symbol::scalar(0.0));
        }
        match self.kind() {
            SymbolKind::Binary { op, left, right } => {
                let (dl, dr) = (left.diff(variable)?, right.diff(variable)?);
                match op {
                    BinaryOp::Add => simplify::add(dl, dr),
                    BinaryOp::Multiply => {
                        let mut terms = Vec::with_capacity(2);
                        if !is_zero(&dl) {
                            terms.push(simplify::multiply(dl, right.as_ref().clone())?);
                        }
                        if !is_zero(&dr) {
                            terms.push(simplify::multiply(left.as_ref().clone(), dr)?);
                        }
                        terms
                            .into_iter()
                            .try_fold(Symbol::scalar(0.0), simplify::add)
                    }
                }
            }
            SymbolKind::Broadcast { kind, child } => {
                let derivative = child.diff(variable)?;
                match kind {
                    BroadcastKind::Primary => {
                        Symbol::primary_broadcast(derivative, self.domain().to_vec())
                    }
                    BroadcastKind::Full => {
                        Symbol::full_broadcast(derivative, self.domains().clone())
                    }
                }
            }
            SymbolKind::Index { child, rows } => Symbol::index(child.diff(variable)?, rows.clone()),
            SymbolKind::Concatenation(concat) => concat.diff(variable),
            // leaves other than `variable` itself never contain it
            _ => Ok(Symbol::scalar(0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::ast::Symbol;
    use crate::ir::domain::Domains;
    use crate::ir::transform::simplify::{add, multiply};

    #[test]
    fn test_leaf_derivatives() {
        let a = Symbol::variable("a", Domains::default());
        let b = Symbol::variable("b", Domains::default());
        assert_eq!(a.diff(&a), Ok(Symbol::scalar(1.0)));
        assert_eq!(b.diff(&a), Ok(Symbol::scalar(0.0)));
    }

    #[test]
    fn test_sum_and_product_rules() {
        let a = Symbol::variable("a", Domains::default());
        let b = Symbol::variable("b", Domains::default());
        let sum = add(a.clone(), b.clone()).expect("sum");
        assert_eq!(sum.diff(&a), Ok(Symbol::scalar(1.0)));

        let product = multiply(a.clone(), b.clone()).expect("product");
        assert_eq!(product.diff(&a), Ok(b.clone()));

        let scaled = multiply(Symbol::scalar(3.0), a.clone()).expect("product");
        assert_eq!(scaled.diff(&a), Ok(Symbol::scalar(3.0)));
    }

    #[test]
    fn test_broadcast_derivative_keeps_domain() {
        let a = Symbol::variable("a", Domains::default());
        let broadcast = Symbol::primary_broadcast(a.clone(), ["separator"]).expect("broadcast");
        let d = broadcast.diff(&a).expect("derivative");
        assert_eq!(d.domain(), &["separator".to_string()]);
        assert_eq!(d.broadcast_child().map(|(_, c)| c.clone()), Some(Symbol::scalar(1.0)));
    }
}
