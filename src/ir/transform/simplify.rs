//! Simplifying constructors.
//!
//! These are the sanctioned ways to build binary and concatenation nodes:
//! each builds the raw node and then applies the simplifications that keep
//! trees small (constant folding, broadcast and state-vector collapse).

use crate::ir::ast::{BinaryOp, BroadcastKind, EvalContext, Symbol, SymbolKind};
use crate::ir::concatenation::{
    concatenation_variable, domain_concatenation_node, new_concatenation,
    numpy_concatenation_node, ConcatenationKind, DomainLayout,
};
use crate::ir::error::{IrError, Result};
use crate::ir::value::Value;
use crate::mesh::Mesh;
use ndarray::Array2;
use std::sync::Arc;

// =============================================================================
// Constant folding
// =============================================================================

/// Replace a constant subtree by the leaf holding its value.
pub fn simplify_if_constant(symbol: Symbol) -> Result<Symbol> {
    if !symbol.is_constant() {
        return Ok(symbol);
    }
    if matches!(
        symbol.kind(),
        SymbolKind::Scalar(_) | SymbolKind::Vector(_) | SymbolKind::Matrix(_)
    ) {
        return Ok(symbol);
    }
    // constant but not yet evaluable, e.g. an undiscretised broadcast
    let Ok(value) = symbol.evaluate(&EvalContext::new()) else {
        return Ok(symbol);
    };
    match value {
        Value::Scalar(v) => Ok(Symbol::scalar(v)),
        Value::Dense(a) if a.ncols() == 1 => Ok(Symbol::column(a, symbol.domains().clone())),
        other => Symbol::matrix(other),
    }
}

fn is_scalar_value(symbol: &Symbol, value: f64) -> bool {
    matches!(symbol.kind(), SymbolKind::Scalar(v) if *v == value)
}

/// Binary node with identities applied and constants folded.
pub fn binary(op: BinaryOp, left: Symbol, right: Symbol) -> Result<Symbol> {
    match op {
        BinaryOp::Add if is_scalar_value(&left, 0.0) => return Ok(right),
        BinaryOp::Add if is_scalar_value(&right, 0.0) => return Ok(left),
        BinaryOp::Multiply if is_scalar_value(&left, 1.0) => return Ok(right),
        BinaryOp::Multiply if is_scalar_value(&right, 1.0) => return Ok(left),
        _ => {}
    }
    simplify_if_constant(Symbol::binary(op, left, right)?)
}

pub fn add(left: Symbol, right: Symbol) -> Result<Symbol> {
    binary(BinaryOp::Add, left, right)
}

pub fn multiply(left: Symbol, right: Symbol) -> Result<Symbol> {
    binary(BinaryOp::Multiply, left, right)
}

// =============================================================================
// Concatenations
// =============================================================================

/// Concatenate `children`, picking the most specific form.
///
/// A single child is returned unchanged, all-variable children give a
/// variable concatenation, and broadcasts of one shared child collapse into a
/// single broadcast over the union of their domains.
pub fn concatenation(mut children: Vec<Symbol>) -> Result<Symbol> {
    match children.len() {
        0 => Err(IrError::Value(
            "Cannot create empty concatenation".to_string(),
        )),
        1 => Ok(children.remove(0)),
        _ if children.iter().all(Symbol::is_variable) => concatenation_variable(children),
        _ => {
            let concat = new_concatenation(children, None, true, None)?;
            match shared_broadcast(&concat) {
                Some((BroadcastKind::Primary, child)) => {
                    Symbol::primary_broadcast(child.clone(), concat.domain().to_vec())
                }
                Some((BroadcastKind::Full, child)) => {
                    Symbol::full_broadcast(child.clone(), concat.domains().clone())
                }
                None => Ok(concat),
            }
        }
    }
}

/// Kind of the first child and the broadcast child, if every child of
/// `concat` broadcasts the same symbol.
fn shared_broadcast(concat: &Symbol) -> Option<(BroadcastKind, &Symbol)> {
    let children = concat.as_concatenation()?.children();
    let (kind, first) = children.first()?.broadcast_child()?;
    children
        .iter()
        .all(|child| matches!(child.broadcast_child(), Some((_, c)) if c == first))
        .then_some((kind, first))
}

/// Numpy concatenation with nested numpy concatenations flattened.
pub fn numpy_concatenation(children: Vec<Symbol>) -> Result<Symbol> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        let nested = child
            .as_concatenation()
            .filter(|c| matches!(c.kind(), ConcatenationKind::Numpy))
            .map(|c| c.children().to_vec());
        match nested {
            Some(grandchildren) => flat.extend(grandchildren),
            None => flat.push(child),
        }
    }
    simplify_if_constant(numpy_concatenation_node(flat)?)
}

/// Mesh-aware concatenation of `children`.
pub fn domain_concatenation(children: Vec<Symbol>, mesh: &Arc<Mesh>) -> Result<Symbol> {
    simplified_domain_concatenation(children, mesh, None)
}

/// Build a domain concatenation, reusing `copy_this` when given, and
/// collapse it to one state vector when the children are adjacent reads of
/// the state vector.
pub fn simplified_domain_concatenation(
    children: Vec<Symbol>,
    mesh: &Arc<Mesh>,
    copy_this: Option<Arc<DomainLayout>>,
) -> Result<Symbol> {
    let concat = domain_concatenation_node(children, mesh, copy_this)?;
    if let Some(collapsed) = collapse_state_vectors(&concat)? {
        log::debug!("collapsed {} into {}", concat, collapsed);
        return Ok(collapsed);
    }
    simplify_if_constant(concat)
}

fn collapse_state_vectors(concat: &Symbol) -> Result<Option<Symbol>> {
    let Some(node) = concat.as_concatenation() else {
        return Ok(None);
    };
    let Some(layout) = node.layout() else {
        return Ok(None);
    };
    let Some(svs) = node
        .children()
        .iter()
        .map(Symbol::as_state_vector)
        .collect::<Option<Vec<_>>>()
    else {
        return Ok(None);
    };
    let (Some(first), Some(last)) = (svs.first(), svs.last()) else {
        return Ok(None);
    };
    let (first_start, last_stop) = (first.first_start(), last.last_stop());
    if first_start >= last_stop {
        return Ok(None);
    }

    // every index in [first_start, last_stop) read by exactly one child
    let longest = svs.iter().map(|sv| sv.evaluation_array().len()).max().unwrap_or(0);
    let mut counts = vec![0usize; longest.max(last_stop)];
    for sv in &svs {
        for (count, read) in counts.iter_mut().zip(sv.evaluation_array()) {
            *count += usize::from(*read);
        }
    }
    let total: usize = svs.iter().map(|sv| sv.size()).sum();
    if counts[first_start..last_stop].iter().any(|c| *c != 1)
        || total != last_stop - first_start
    {
        return Ok(None);
    }

    // and the layout places them in increasing order
    let indices = svs
        .iter()
        .map(|sv| {
            let picked: Vec<f64> = sv
                .evaluation_array()
                .iter()
                .enumerate()
                .filter(|(_, read)| **read)
                .map(|(i, _)| i as f64)
                .collect();
            Value::column(picked)
        })
        .collect::<Vec<_>>();
    let Ok(Value::Dense(placed)) = layout.scatter(&indices) else {
        return Ok(None);
    };
    let expected = Array2::from_shape_fn((last_stop - first_start, 1), |(i, _)| {
        (first_start + i) as f64
    });
    if placed != expected {
        return Ok(None);
    }

    Symbol::state_vector_on(vec![first_start..last_stop], concat.domains().clone()).map(Some)
}
