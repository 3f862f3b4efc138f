//! Jacobians with respect to a state vector.
//!
//! `jac` builds a symbol which evaluates to the `rows x len(y)` derivative
//! block of an expression. Constant parts contribute sparse zero blocks,
//! state vectors contribute selection matrices, and concatenations stack
//! the blocks of their children.

use super::simplify;
use crate::ir::ast::{BinaryOp, StateVector, Symbol, SymbolKind};
use crate::ir::error::{IrError, Result};
use crate::ir::value::Value;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

fn is_zero(symbol: &Symbol) -> bool {
    matches!(symbol.kind(), SymbolKind::Scalar(v) if *v == 0.0)
}

fn sparse_zeros(nrows: usize, ncols: usize) -> Result<Symbol> {
    Symbol::matrix(Value::Sparse(CsrMatrix::zeros(nrows, ncols)))
}

/// One row per entry read by `sv`, with a one in the column of `y` holding
/// the same state entry.
fn selection_matrix(sv: &StateVector, y: &StateVector) -> Result<Symbol> {
    let mut column_of = vec![None; y.evaluation_array().len()];
    let mut col = 0;
    for (i, read) in y.evaluation_array().iter().enumerate() {
        if *read {
            column_of[i] = Some(col);
            col += 1;
        }
    }
    let mut coo = CooMatrix::new(sv.size(), y.size());
    let picked = sv
        .evaluation_array()
        .iter()
        .enumerate()
        .filter(|(_, read)| **read)
        .map(|(i, _)| i);
    for (row, i) in picked.enumerate() {
        if let Some(Some(col)) = column_of.get(i) {
            coo.push(row, *col, 1.0);
        }
    }
    Symbol::matrix(Value::Sparse(CsrMatrix::from(&coo)))
}

impl Symbol {
    /// Jacobian of this expression with respect to the state vector `y`.
    pub fn jac(&self, y: &Symbol) -> Result<Symbol> {
        let state = y.as_state_vector().ok_or_else(|| {
            IrError::Type(format!(
                "jacobian can only be taken with respect to a state vector, not '{}'",
                y
            ))
        })?;
        self.jac_wrt(state)
    }

    fn jac_wrt(&self, y: &StateVector) -> Result<Symbol> {
        match self.kind() {
            SymbolKind::Scalar(_) | SymbolKind::Time | SymbolKind::InputParameter(_) => {
                Ok(Symbol::scalar(0.0))
            }
            SymbolKind::Vector(a) => sparse_zeros(a.nrows(), y.size()),
            SymbolKind::Matrix(_) => Err(IrError::NotImplemented(
                "jacobian of a matrix constant".to_string(),
            )),
            SymbolKind::StateVector(sv) => selection_matrix(sv, y),
            SymbolKind::Variable(_) | SymbolKind::Broadcast { .. } => {
                Err(IrError::NotImplemented(format!(
                    "jacobian of '{}' is only defined after discretisation",
                    self
                )))
            }
            SymbolKind::Binary { op, left, right } => {
                let (jl, jr) = (left.jac_wrt(y)?, right.jac_wrt(y)?);
                match op {
                    BinaryOp::Add => simplify::add(jl, jr),
                    BinaryOp::Multiply => {
                        let mut terms = Vec::with_capacity(2);
                        if !is_zero(&jl) {
                            terms.push(simplify::multiply(right.as_ref().clone(), jl)?);
                        }
                        if !is_zero(&jr) {
                            terms.push(simplify::multiply(left.as_ref().clone(), jr)?);
                        }
                        terms
                            .into_iter()
                            .try_fold(Symbol::scalar(0.0), simplify::add)
                    }
                }
            }
            SymbolKind::Index { child, rows } => {
                let child_jac = child.jac_wrt(y)?;
                if is_zero(&child_jac) {
                    return Ok(child_jac);
                }
                Symbol::index(child_jac, rows.clone())
            }
            SymbolKind::Concatenation(concat) => {
                let children_jacs = concat
                    .children()
                    .iter()
                    .map(|child| child.jac_wrt(y))
                    .collect::<Result<Vec<_>>>()?;
                concat.concatenation_jac(children_jacs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::ast::{EvalContext, Symbol};
    use crate::ir::error::IrError;
    use crate::ir::transform::simplify::{add, multiply};
    use ndarray::array;

    #[test]
    fn test_selection_matrix() {
        let y = Symbol::state_vector(vec![0..4]).expect("valid");
        let sv = Symbol::state_vector(vec![1..3]).expect("valid");
        let jac = sv.jac(&y).expect("jacobian");
        let value = jac.evaluate(&EvalContext::new()).expect("constant");
        assert!(value.is_sparse());
        assert_eq!(value.to_dense(), array![[0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_constant_vector_is_sparse_zero() {
        let y = Symbol::state_vector(vec![0..3]).expect("valid");
        let jac = Symbol::vector(vec![1.0, 2.0]).jac(&y).expect("jacobian");
        let value = jac.evaluate(&EvalContext::new()).expect("constant");
        assert_eq!(value.shape(), (2, 3));
        assert_eq!(value.to_dense(), array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_scaled_sum() {
        let y = Symbol::state_vector(vec![0..2]).expect("valid");
        let a = Symbol::state_vector(vec![0..2]).expect("valid");
        let expr = add(multiply(Symbol::scalar(2.0), a.clone()).expect("ok"), a).expect("ok");
        let value = expr
            .jac(&y)
            .and_then(|j| j.evaluate(&EvalContext::new()))
            .expect("constant jacobian");
        assert_eq!(value.to_dense(), array![[3.0, 0.0], [0.0, 3.0]]);
    }

    #[test]
    fn test_product_rule_needs_state() {
        let y = Symbol::state_vector(vec![0..2]).expect("valid");
        let expr = multiply(y.clone(), y.clone()).expect("ok");
        let jac = expr.jac(&y).expect("jacobian");
        let state = [3.0, 4.0];
        let value = jac
            .evaluate(&EvalContext::new().with_y(&state))
            .expect("evaluates");
        assert_eq!(value.to_dense(), array![[6.0, 0.0], [0.0, 8.0]]);
    }

    #[test]
    fn test_variable_not_implemented() {
        let y = Symbol::state_vector(vec![0..2]).expect("valid");
        let v = Symbol::variable("c", Default::default());
        assert!(matches!(v.jac(&y), Err(IrError::NotImplemented(_))));
        assert!(matches!(y.jac(&v), Err(IrError::Type(_))));
    }
}
