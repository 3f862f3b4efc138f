//! Untyped join of column vectors.

use super::{build, sparse_stack, ConcatenationKind};
use crate::ir::ast::Symbol;
use crate::ir::domain::Domains;
use crate::ir::error::Result;
use crate::ir::transform::simplify;

/// Numpy concatenation node without simplification.
///
/// Children that evaluate to a plain number are first turned into
/// one-element columns, so the join only ever sees 1-D data.
pub(crate) fn numpy_concatenation_node(children: Vec<Symbol>) -> Result<Symbol> {
    let children = children
        .into_iter()
        .map(|child| {
            if child.evaluates_to_number() {
                simplify::multiply(child, Symbol::vector(vec![1.0]))
            } else {
                Ok(child)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(build(
        ConcatenationKind::Numpy,
        "numpy_concatenation",
        children,
        Domains::default(),
    ))
}

pub(super) fn concatenation_jac(children_jacs: Vec<Symbol>) -> Result<Symbol> {
    if children_jacs.is_empty() {
        return Ok(Symbol::scalar(0.0));
    }
    sparse_stack(children_jacs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::EvalContext;
    use crate::ir::value::Value;

    #[test]
    fn test_numbers_become_columns() {
        let children = vec![Symbol::scalar(4.0), Symbol::vector(vec![1.0, 2.0])];
        let node = numpy_concatenation_node(children).expect("valid children");
        assert_eq!(node.name(), "numpy_concatenation");
        assert!(node.domains().is_empty());
        assert_eq!(
            node.evaluate(&EvalContext::new()),
            Ok(Value::column(vec![4.0, 1.0, 2.0]))
        );
    }

    #[test]
    fn test_empty_jacobian_is_zero() {
        assert_eq!(concatenation_jac(vec![]), Ok(Symbol::scalar(0.0)));
    }
}
