//! Mesh-aware concatenation.
//!
//! Once the mesh is known every domain has a point count, so the position of
//! each child's values inside the final flat vector can be computed up front.
//! The layout is repeated once per point of the auxiliary domains: for a
//! secondary domain with `k` points the primary pattern
//! `[child 0 | child 1 | ...]` appears `k` times back to back.

use super::{build, get_children_domains, sparse_stack, ConcatenationKind};
use crate::ir::ast::Symbol;
use crate::ir::domain::Domains;
use crate::ir::error::{IrError, Result};
use crate::ir::value::Value;
use crate::mesh::Mesh;
use ndarray::{s, Array2};
use ordermap::OrderMap;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

/// Domain name to one half-open range per auxiliary repeat.
pub type SliceTable = OrderMap<String, Vec<Range<usize>>>;

/// Immutable slice tables of a domain-aware concatenation.
///
/// Shared by `Arc` between a node and its copies, so rebuilding a node with
/// simplified children never recomputes the layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainLayout {
    #[serde(skip)]
    mesh: Arc<Mesh>,
    secondary_repeat_count: usize,
    slices: SliceTable,
    size: usize,
    children_slices: Vec<SliceTable>,
}

impl DomainLayout {
    /// Compute the composite and per-child slice tables.
    pub fn compute(domains: &Domains, children: &[&Domains], mesh: Arc<Mesh>) -> Result<Self> {
        if domains.primary.is_empty() {
            return Err(IrError::Value(
                "Cannot create empty concatenation".to_string(),
            ));
        }
        let secondary_repeat_count = Self::auxiliary_repeats(domains, &mesh)?;
        let slices = create_slices(&domains.primary, secondary_repeat_count, &mesh)?;
        let size = slices
            .values()
            .filter_map(|ranges| ranges.last())
            .map(|range| range.end)
            .max()
            .unwrap_or(0);

        let children_slices = children
            .iter()
            .map(|child| {
                if Self::auxiliary_repeats(child, &mesh)? != secondary_repeat_count {
                    return Err(IrError::Value(
                        "Concatenation and children must have the same number of points \
                         in secondary dimensions"
                            .to_string(),
                    ));
                }
                create_slices(&child.primary, secondary_repeat_count, &mesh)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "domain concatenation over {:?}: {} repeat(s), size {}",
            domains.primary,
            secondary_repeat_count,
            size
        );

        Ok(Self {
            mesh,
            secondary_repeat_count,
            slices,
            size,
            children_slices,
        })
    }

    /// Number of times the primary layout repeats: the product, over the
    /// populated auxiliary levels, of the points in that level's domains.
    pub fn auxiliary_repeats(domains: &Domains, mesh: &Mesh) -> Result<usize> {
        domains
            .auxiliary()
            .try_fold(1, |acc, (_, names)| Ok(acc * mesh.npts_for(names)?))
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn secondary_repeat_count(&self) -> usize {
        self.secondary_repeat_count
    }

    pub fn slices(&self) -> &SliceTable {
        &self.slices
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn children_slices(&self) -> &[SliceTable] {
        &self.children_slices
    }

    /// Number of entries child `idx` contributes.
    pub fn child_size(&self, idx: usize) -> usize {
        self.children_slices
            .get(idx)
            .map(|table| table.values().flatten().map(|range| range.len()).sum())
            .unwrap_or(0)
    }

    /// Write each child's values into its composite slices.
    pub(crate) fn scatter(&self, children_eval: &[Value]) -> Result<Value> {
        if children_eval.len() != self.children_slices.len() {
            return Err(IrError::Shape(format!(
                "expected {} child values, got {}",
                self.children_slices.len(),
                children_eval.len()
            )));
        }
        let mut vector = Array2::zeros((self.size, 1));
        for (child_value, child_slices) in children_eval.iter().zip(&self.children_slices) {
            let Value::Dense(child) = child_value else {
                return Err(IrError::Shape(format!(
                    "domain concatenation children must evaluate to column vectors, got shape {:?}",
                    child_value.shape()
                )));
            };
            if child.ncols() != 1 {
                return Err(IrError::Shape(format!(
                    "domain concatenation children must evaluate to column vectors, got shape {:?}",
                    child.dim()
                )));
            }
            for (dom, ranges) in child_slices {
                let targets = self.slices.get(dom).ok_or_else(|| {
                    IrError::Value(format!("domain '{}' is not part of the concatenation", dom))
                })?;
                for (source, target) in ranges.iter().zip(targets) {
                    if source.end > child.nrows() || source.len() != target.len() {
                        return Err(IrError::Shape(format!(
                            "child of length {} cannot fill slice {:?} of domain '{}'",
                            child.nrows(),
                            source,
                            dom
                        )));
                    }
                    vector
                        .slice_mut(s![target.clone(), ..])
                        .assign(&child.slice(s![source.clone(), 0..1]));
                }
            }
        }
        Ok(Value::Dense(vector))
    }

    /// Stack, for every repeat and then every child, the rows of the child's
    /// Jacobian that belong to that repeat.
    pub(crate) fn concatenation_jac(&self, children_jacs: Vec<Symbol>) -> Result<Symbol> {
        if self.children_slices.iter().any(|slices| slices.len() > 1) {
            return Err(IrError::NotImplemented(
                "jacobian only implemented for when each child has a single domain".to_string(),
            ));
        }
        let mut jacs = Vec::with_capacity(self.secondary_repeat_count * children_jacs.len());
        for i in 0..self.secondary_repeat_count {
            for (child_jac, slices) in children_jacs.iter().zip(&self.children_slices) {
                let child_slice = slices
                    .values()
                    .next()
                    .and_then(|ranges| ranges.get(i))
                    .ok_or_else(|| IrError::Value(format!("child has no slice for repeat {}", i)))?;
                jacs.push(Symbol::index(child_jac.clone(), child_slice.clone())?);
            }
        }
        sparse_stack(jacs)
    }
}

/// Lay out `primary` domains back to back, `repeats` times.
fn create_slices(primary: &[String], repeats: usize, mesh: &Mesh) -> Result<SliceTable> {
    let mut slices = SliceTable::new();
    let mut start = 0;
    for _ in 0..repeats {
        for dom in primary {
            let end = start + mesh.npts(dom)?;
            slices.entry(dom.clone()).or_default().push(start..end);
            start = end;
        }
    }
    Ok(slices)
}

/// Build a domain-aware concatenation node without simplification.
///
/// When `copy_this` is given its layout is reused as is; the children must be
/// equivalent to the ones the layout was computed for.
pub(crate) fn domain_concatenation_node(
    children: Vec<Symbol>,
    mesh: &Arc<Mesh>,
    copy_this: Option<Arc<DomainLayout>>,
) -> Result<Symbol> {
    let domains = get_children_domains(&children)?;
    let layout = match copy_this {
        Some(layout) => {
            if layout.children_slices.len() != children.len() {
                return Err(IrError::Value(format!(
                    "cannot reuse a layout for {} children with {} children",
                    layout.children_slices.len(),
                    children.len()
                )));
            }
            layout
        }
        None => {
            let child_domains: Vec<&Domains> = children.iter().map(Symbol::domains).collect();
            Arc::new(DomainLayout::compute(&domains, &child_domains, Arc::clone(mesh))?)
        }
    };
    Ok(build(
        ConcatenationKind::Domain(layout),
        "domain_concatenation",
        children,
        domains,
    ))
}
