//! Row-wise stacking of Jacobian blocks.

use super::{build, ConcatFn, ConcatenationKind};
use crate::ir::ast::Symbol;
use crate::ir::domain::Domains;
use crate::ir::error::Result;

/// Vertical stack of 2-D blocks, typically Jacobians.
///
/// The result is sparse as soon as one block is sparse, otherwise dense.
pub fn sparse_stack(children: Vec<Symbol>) -> Result<Symbol> {
    let mut any_sparse = false;
    for child in &children {
        if child.evaluate_for_shape()?.is_sparse() {
            any_sparse = true;
            break;
        }
    }
    let concat_fn = if any_sparse {
        ConcatFn::SparseStack
    } else {
        ConcatFn::DenseStack
    };
    Ok(build(
        ConcatenationKind::SparseStack(concat_fn),
        "sparse_stack",
        children,
        Domains::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::EvalContext;
    use crate::ir::value::Value;
    use nalgebra_sparse::CsrMatrix;
    use ndarray::array;

    #[test]
    fn test_dense_blocks_stay_dense() {
        let a = Symbol::matrix(Value::Dense(array![[1.0, 0.0]])).expect("2-D");
        let b = Symbol::matrix(Value::Dense(array![[0.0, 2.0]])).expect("2-D");
        let stack = sparse_stack(vec![a, b]).expect("valid blocks");
        let concat = stack.as_concatenation().expect("concatenation");
        assert_eq!(concat.concatenation_function(), Some(ConcatFn::DenseStack));
        assert_eq!(
            stack.evaluate(&EvalContext::new()),
            Ok(Value::Dense(array![[1.0, 0.0], [0.0, 2.0]]))
        );
    }

    #[test]
    fn test_one_sparse_block_makes_result_sparse() {
        let a = Symbol::matrix(Value::Sparse(CsrMatrix::identity(2))).expect("2-D");
        let b = Symbol::matrix(Value::Dense(array![[3.0, 4.0]])).expect("2-D");
        let stack = sparse_stack(vec![a, b]).expect("valid blocks");
        let value = stack.evaluate(&EvalContext::new()).expect("evaluates");
        assert!(value.is_sparse());
        assert_eq!(value.to_dense(), array![[1.0, 0.0], [0.0, 1.0], [3.0, 4.0]]);
    }
}
