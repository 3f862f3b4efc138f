//! Concatenation nodes.
//!
//! A concatenation joins the evaluated values of its children, in order, into
//! one value. Five flavours share a single node type and differ in how the
//! join is done:
//!
//! - `Generic`: symbolic, domain-checked; joins with an optional function.
//! - `Numpy`: untyped join of column vectors, no domain checks.
//! - `SparseStack`: vertical stack of 2-D blocks (dense or sparse).
//! - `Domain`: mesh-aware scatter into precomputed slices.
//! - `Variable`: symbolic concatenation of model variables carrying merged
//!   name, scale, reference and bounds.
//!
//! Direct construction is crate-private; the public entry points are the
//! simplifying constructors in `transform::simplify` plus [`sparse_stack`].

mod domain;
mod numpy;
mod stack;
mod variable;

pub use domain::{DomainLayout, SliceTable};
pub use stack::sparse_stack;
pub use variable::{intersect, VariableMeta};

pub(crate) use domain::domain_concatenation_node;
pub(crate) use numpy::numpy_concatenation_node;
pub(crate) use variable::concatenation_variable;

use crate::ir::ast::{EvalContext, Symbol, SymbolKind};
use crate::ir::domain::Domains;
use crate::ir::error::{IrError, Result};
use crate::ir::transform::simplify;
use crate::ir::value::Value;
use std::sync::Arc;

/// How evaluated children are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatFn {
    /// Ordered join of column vectors along the first axis.
    Join,
    /// Dense vertical stack of 2-D blocks.
    DenseStack,
    /// Sparse vertical stack of 2-D blocks.
    SparseStack,
}

impl ConcatFn {
    pub fn apply(&self, values: &[Value]) -> Result<Value> {
        match self {
            ConcatFn::Join => Value::concatenate(values),
            ConcatFn::DenseStack => Value::vstack_dense(values),
            ConcatFn::SparseStack => Value::vstack_sparse(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConcatenationKind {
    Generic(Option<ConcatFn>),
    Numpy,
    SparseStack(ConcatFn),
    Domain(Arc<DomainLayout>),
    Variable(VariableMeta),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Concatenation {
    kind: ConcatenationKind,
    children: Vec<Symbol>,
}

/// Merged domains of concatenation children (see [`Domains::concatenate`]).
pub fn get_children_domains(children: &[Symbol]) -> Result<Domains> {
    Domains::concatenate(children.iter().map(Symbol::domains))
}

/// Base concatenation constructor.
///
/// Rejects children that are all variables: those must go through the
/// variable-aware path, which keeps their scale, reference and bounds.
pub(crate) fn new_concatenation(
    children: Vec<Symbol>,
    name: Option<&str>,
    check_domain: bool,
    concat_fn: Option<ConcatFn>,
) -> Result<Symbol> {
    if !children.is_empty() && children.iter().all(Symbol::is_variable) {
        return Err(IrError::Type(
            "'ConcatenationVariable' should be used for concatenating 'Variable' objects. \
             We recommend using the 'concatenation' function, which will automatically \
             choose the best form."
                .to_string(),
        ));
    }
    let domains = if check_domain {
        get_children_domains(&children)?
    } else {
        Domains::default()
    };
    Ok(build(
        ConcatenationKind::Generic(concat_fn),
        name.unwrap_or("concatenation"),
        children,
        domains,
    ))
}

pub(crate) fn build(
    kind: ConcatenationKind,
    name: &str,
    children: Vec<Symbol>,
    domains: Domains,
) -> Symbol {
    Symbol::from_parts(
        name,
        domains,
        SymbolKind::Concatenation(Concatenation { kind, children }),
    )
}

impl Concatenation {
    pub fn kind(&self) -> &ConcatenationKind {
        &self.kind
    }

    pub fn children(&self) -> &[Symbol] {
        &self.children
    }

    pub fn concatenation_function(&self) -> Option<ConcatFn> {
        match &self.kind {
            ConcatenationKind::Generic(f) => *f,
            ConcatenationKind::Numpy => Some(ConcatFn::Join),
            ConcatenationKind::SparseStack(f) => Some(*f),
            ConcatenationKind::Domain(_) | ConcatenationKind::Variable(_) => None,
        }
    }

    /// Slice tables of a domain-aware concatenation.
    pub fn layout(&self) -> Option<&Arc<DomainLayout>> {
        match &self.kind {
            ConcatenationKind::Domain(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn variable_meta(&self) -> Option<&VariableMeta> {
        match &self.kind {
            ConcatenationKind::Variable(meta) => Some(meta),
            _ => None,
        }
    }

    pub(crate) fn evaluate(&self, ctx: &EvalContext) -> Result<Value> {
        let children_eval = self
            .children
            .iter()
            .map(|child| child.evaluate(ctx))
            .collect::<Result<Vec<_>>>()?;
        self.concatenation_evaluate(&children_eval)
    }

    fn concatenation_evaluate(&self, children_eval: &[Value]) -> Result<Value> {
        if let ConcatenationKind::Domain(layout) = &self.kind {
            return layout.scatter(children_eval);
        }
        if children_eval.is_empty() {
            return Ok(Value::empty());
        }
        self.concatenation_function()
            .unwrap_or(ConcatFn::Join)
            .apply(children_eval)
    }

    pub(crate) fn evaluate_for_shape(&self) -> Result<Value> {
        if self.children.is_empty() {
            return Ok(Value::empty());
        }
        let shapes = self
            .children
            .iter()
            .map(Symbol::evaluate_for_shape)
            .collect::<Result<Vec<_>>>()?;
        self.concatenation_function()
            .unwrap_or(ConcatFn::Join)
            .apply(&shapes)
    }

    pub(crate) fn is_constant(&self) -> bool {
        self.children.iter().all(Symbol::is_constant)
    }

    /// Deep copy rebuilt through the simplifying constructor of this kind.
    pub(crate) fn new_copy(&self) -> Result<Symbol> {
        let children = self
            .children
            .iter()
            .map(Symbol::new_copy)
            .collect::<Result<Vec<_>>>()?;
        self.concatenation_new_copy(children)
    }

    pub(crate) fn concatenation_new_copy(&self, children: Vec<Symbol>) -> Result<Symbol> {
        match &self.kind {
            ConcatenationKind::Generic(_) | ConcatenationKind::Variable(_) => {
                simplify::concatenation(children)
            }
            ConcatenationKind::Numpy => simplify::numpy_concatenation(children),
            ConcatenationKind::SparseStack(_) => sparse_stack(children),
            ConcatenationKind::Domain(layout) => simplify::simplified_domain_concatenation(
                children,
                layout.mesh(),
                Some(Arc::clone(layout)),
            ),
        }
    }

    /// Jacobian of the concatenation given the Jacobians of its children.
    pub(crate) fn concatenation_jac(&self, children_jacs: Vec<Symbol>) -> Result<Symbol> {
        match &self.kind {
            ConcatenationKind::Numpy => numpy::concatenation_jac(children_jacs),
            ConcatenationKind::Domain(layout) => layout.concatenation_jac(children_jacs),
            _ => Err(IrError::NotImplemented(
                "Jacobian is only defined for numpy and domain concatenations".to_string(),
            )),
        }
    }

    /// Derivative of each child, re-wrapped in the same kind of concatenation.
    pub(crate) fn diff(&self, variable: &Symbol) -> Result<Symbol> {
        let mut diffs = self
            .children
            .iter()
            .map(|child| child.diff(variable))
            .collect::<Result<Vec<_>>>()?;
        if diffs.len() == 1 {
            return Ok(diffs.remove(0));
        }
        let diffs = diffs
            .into_iter()
            .enumerate()
            .map(|(idx, derivative)| self.restore_domains(idx, derivative))
            .collect::<Result<Vec<_>>>()?;
        self.rewrap(diffs)
    }

    /// Give a domain-less derivative the domains of the child it came from,
    /// so that the re-wrapped concatenation passes domain validation.
    fn restore_domains(&self, idx: usize, derivative: Symbol) -> Result<Symbol> {
        let child = &self.children[idx];
        if child.domain().is_empty() || !derivative.domain().is_empty() {
            return Ok(derivative);
        }
        match &self.kind {
            ConcatenationKind::Numpy | ConcatenationKind::SparseStack(_) => Ok(derivative),
            ConcatenationKind::Domain(layout) => {
                let size = layout.child_size(idx);
                match derivative.evaluate(&EvalContext::new()) {
                    Ok(Value::Scalar(v)) => {
                        Ok(Symbol::vector_on(vec![v; size], child.domains().clone()))
                    }
                    Ok(value) if value.is_column() && value.nrows() == size => Ok(Symbol::column(
                        value.to_dense(),
                        child.domains().clone(),
                    )),
                    _ => Err(IrError::NotImplemented(format!(
                        "cannot place derivative '{}' on the domains of '{}'",
                        derivative, child
                    ))),
                }
            }
            ConcatenationKind::Generic(_) | ConcatenationKind::Variable(_) => {
                if child.domains().has_auxiliary() {
                    Symbol::full_broadcast(derivative, child.domains().clone())
                } else {
                    Symbol::primary_broadcast(derivative, child.domain().to_vec())
                }
            }
        }
    }

    /// Same kind of node around new children, without simplification.
    fn rewrap(&self, children: Vec<Symbol>) -> Result<Symbol> {
        match &self.kind {
            // Derivatives of variables are no longer variables.
            ConcatenationKind::Generic(_) | ConcatenationKind::Variable(_) => {
                let concat_fn = self.concatenation_function();
                let domains = get_children_domains(&children)?;
                Ok(build(
                    ConcatenationKind::Generic(concat_fn),
                    "concatenation",
                    children,
                    domains,
                ))
            }
            ConcatenationKind::Numpy => numpy_concatenation_node(children),
            ConcatenationKind::SparseStack(_) => sparse_stack(children),
            ConcatenationKind::Domain(layout) => {
                domain_concatenation_node(children, layout.mesh(), Some(Arc::clone(layout)))
            }
        }
    }
}
