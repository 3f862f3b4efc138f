//! Discretisation of symbolic expressions on a mesh.
//!
//! Assigns every model variable a set of ranges in the solver state vector
//! and rewrites expressions so that variables become state-vector reads,
//! constant broadcasts become vectors and symbolic concatenations become
//! mesh-aware ones.
use crate::ir::ast::{EvalContext, Symbol, SymbolId, SymbolKind};
use crate::ir::concatenation::{ConcatenationKind, DomainLayout};
use crate::ir::domain::Domains;
use crate::ir::error::{IrError, Result};
use crate::ir::transform::simplify;
use crate::ir::value::Value;
use crate::mesh::Mesh;
use ordermap::OrderMap;
use std::ops::Range;
use std::sync::Arc;

/// State-vector ranges of each variable, keyed by variable id.
pub type VariableSlices = OrderMap<SymbolId, Vec<Range<usize>>>;

#[derive(Debug, Clone)]
pub struct Discretisation {
    mesh: Arc<Mesh>,
    y_slices: VariableSlices,
    y_size: usize,
}

impl Discretisation {
    pub fn new(mesh: Arc<Mesh>) -> Self {
        Self {
            mesh,
            y_slices: VariableSlices::new(),
            y_size: 0,
        }
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn y_slices(&self) -> &VariableSlices {
        &self.y_slices
    }

    /// Number of state entries assigned so far.
    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Points of one repeat of the primary domain; domain-less symbols are
    /// a single point.
    fn primary_npts(&self, domains: &Domains) -> Result<usize> {
        if domains.primary.is_empty() {
            Ok(1)
        } else {
            self.mesh.npts_for(&domains.primary)
        }
    }

    fn size_of(&self, domains: &Domains) -> Result<usize> {
        Ok(self.primary_npts(domains)? * DomainLayout::auxiliary_repeats(domains, &self.mesh)?)
    }

    /// Give each variable, in order, the next free ranges of the state
    /// vector.
    ///
    /// Children of a variable concatenation are interleaved per auxiliary
    /// repeat, matching the layout of the mesh-aware concatenation they will
    /// be discretised into. Nothing is recorded unless every variable can be
    /// assigned.
    pub fn set_variable_slices(&mut self, variables: &[Symbol]) -> Result<()> {
        let mut pending: Vec<(&Symbol, Vec<Range<usize>>)> = Vec::new();
        let mut start = self.y_size;
        for variable in variables {
            match variable.kind() {
                SymbolKind::Variable(_) => {
                    let end = start + self.size_of(variable.domains())?;
                    pending.push((variable, vec![start..end]));
                    start = end;
                }
                SymbolKind::Concatenation(concat)
                    if matches!(concat.kind(), ConcatenationKind::Variable(_)) =>
                {
                    let repeats =
                        DomainLayout::auxiliary_repeats(variable.domains(), &self.mesh)?;
                    let children = concat.children();
                    for child in children {
                        let child_repeats =
                            DomainLayout::auxiliary_repeats(child.domains(), &self.mesh)?;
                        if child_repeats != repeats {
                            return Err(IrError::Value(
                                "Concatenation and children must have the same number of \
                                 points in secondary dimensions"
                                    .to_string(),
                            ));
                        }
                    }
                    let mut children_slices = vec![Vec::with_capacity(repeats); children.len()];
                    for _ in 0..repeats {
                        for (child, slices) in children.iter().zip(&mut children_slices) {
                            let end = start + self.primary_npts(child.domains())?;
                            slices.push(start..end);
                            start = end;
                        }
                    }
                    pending.extend(children.iter().zip(children_slices));
                }
                _ => {
                    return Err(IrError::Type(format!(
                        "state vector slices can only be assigned to variables, not '{}'",
                        variable
                    )))
                }
            }
        }

        let mut ids = Vec::with_capacity(pending.len());
        for (variable, _) in &pending {
            let id = variable.id().ok_or_else(|| {
                IrError::Type(format!("'{}' is not a variable", variable))
            })?;
            if self.y_slices.contains_key(&id) || ids.contains(&id) {
                return Err(IrError::Value(format!(
                    "variable '{}' already has state vector slices",
                    variable.name()
                )));
            }
            ids.push(id);
        }
        for (id, (variable, slices)) in ids.into_iter().zip(pending) {
            log::debug!("variable '{}' -> {:?}", variable.name(), slices);
            self.y_slices.insert(id, slices);
        }
        self.y_size = start;
        Ok(())
    }

    /// Discretised copy of `symbol`.
    pub fn process_symbol(&self, symbol: &Symbol) -> Result<Symbol> {
        match symbol.kind() {
            SymbolKind::Variable(variable) => {
                let slices = self.y_slices.get(&variable.id).ok_or_else(|| {
                    IrError::Value(format!(
                        "no state vector slices set for variable '{}'",
                        symbol.name()
                    ))
                })?;
                Symbol::state_vector_on(slices.clone(), symbol.domains().clone())
            }
            SymbolKind::Broadcast { child, .. } => self.process_broadcast(symbol, child),
            SymbolKind::Binary { op, left, right } => simplify::binary(
                *op,
                self.process_symbol(left)?,
                self.process_symbol(right)?,
            ),
            SymbolKind::Index { child, rows } => {
                Symbol::index(self.process_symbol(child)?, rows.clone())
            }
            SymbolKind::Concatenation(concat) => {
                let children = concat
                    .children()
                    .iter()
                    .map(|child| self.process_symbol(child))
                    .collect::<Result<Vec<_>>>()?;
                match concat.kind() {
                    ConcatenationKind::Generic(_) | ConcatenationKind::Variable(_)
                        if !symbol.domains().is_empty() =>
                    {
                        simplify::domain_concatenation(children, &self.mesh)
                    }
                    _ => concat.concatenation_new_copy(children),
                }
            }
            _ => Ok(symbol.clone()),
        }
    }

    /// A constant broadcast becomes a vector of the discretised size: a
    /// number fills it, a column has each entry repeated over the primary
    /// points.
    fn process_broadcast(&self, symbol: &Symbol, child: &Symbol) -> Result<Symbol> {
        let child = self.process_symbol(child)?;
        let not_constant = || {
            IrError::NotImplemented(format!(
                "cannot discretise broadcast of non-constant '{}'",
                child
            ))
        };
        if !child.is_constant() {
            return Err(not_constant());
        }
        let size = self.size_of(symbol.domains())?;
        let npts = self.primary_npts(symbol.domains())?;
        let values = match child.evaluate(&EvalContext::new()).map_err(|_| not_constant())? {
            Value::Scalar(v) => vec![v; size],
            value => {
                let column = value.column_values()?;
                if column.len() * npts != size {
                    return Err(IrError::Shape(format!(
                        "cannot broadcast {} values onto {} points",
                        column.len(),
                        size
                    )));
                }
                column
                    .into_iter()
                    .flat_map(|v| std::iter::repeat(v).take(npts))
                    .collect()
            }
        };
        Ok(Symbol::vector_on(values, symbol.domains().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::Variable;
    use crate::ir::domain::DomainLevel;

    fn mesh() -> Arc<Mesh> {
        Arc::new(
            Mesh::new()
                .with_domain("negative electrode", 5)
                .with_domain("separator", 3)
                .with_domain("positive electrode", 4)
                .with_domain("current collector", 2),
        )
    }

    fn var(name: &str, domains: Domains) -> Symbol {
        Symbol::variable(name, domains)
    }

    #[test]
    fn test_slices_in_order() {
        let mut disc = Discretisation::new(mesh());
        let a = var("a", Domains::primary(["negative electrode"]));
        let b = var("b", Domains::primary(["separator"]));
        let t = var("T", Domains::default());
        disc.set_variable_slices(&[a.clone(), b.clone(), t.clone()])
            .expect("all variables");
        assert_eq!(disc.y_slices()[&a.id().expect("id")], vec![0..5]);
        assert_eq!(disc.y_slices()[&b.id().expect("id")], vec![5..8]);
        assert_eq!(disc.y_slices()[&t.id().expect("id")], vec![8..9]);
        assert_eq!(disc.y_size(), 9);
    }

    #[test]
    fn test_slices_assigned_once() {
        let mut disc = Discretisation::new(mesh());
        let a = var("a", Domains::primary(["separator"]));
        disc.set_variable_slices(&[a.clone()]).expect("first time");
        assert!(matches!(
            disc.set_variable_slices(&[a]),
            Err(IrError::Value(_))
        ));
    }

    #[test]
    fn test_concatenated_variables_interleave() {
        let d = |name: &str| {
            Domains::primary([name]).with_level(DomainLevel::Secondary, ["current collector"])
        };
        let a = var("c_n", d("negative electrode"));
        let b = var("c_s", d("separator"));
        let c = simplify::concatenation(vec![a.clone(), b.clone()]).expect("variables");
        let mut disc = Discretisation::new(mesh());
        disc.set_variable_slices(&[c.clone()]).expect("variable concatenation");
        assert_eq!(disc.y_slices()[&a.id().expect("id")], vec![0..5, 8..13]);
        assert_eq!(disc.y_slices()[&b.id().expect("id")], vec![5..8, 13..16]);

        let processed = disc.process_symbol(&c).expect("discretised");
        let sv = processed.as_state_vector().expect("collapsed to one read");
        assert_eq!(sv.y_slices(), &[0..16]);
    }

    #[test]
    fn test_failed_assignment_records_nothing() {
        let c_n = var(
            "c_n",
            Domains::primary(["negative electrode"])
                .with_level(DomainLevel::Secondary, ["current collector"]),
        );
        let c_s = var("c_s", Domains::primary(["separator"]));
        let c = simplify::concatenation(vec![c_n.clone(), c_s]).expect("compatible domains");
        let mut disc = Discretisation::new(mesh());
        assert!(matches!(disc.set_variable_slices(&[c]), Err(IrError::Value(_))));
        assert!(disc.y_slices().is_empty());
        assert_eq!(disc.y_size(), 0);

        let d = var("d", Domains::primary(["separator"]));
        let a = var("a", Domains::primary(["separator"]));
        assert!(disc.set_variable_slices(&[d.clone(), a.clone(), a]).is_err());
        assert!(disc.y_slices().is_empty());

        disc.set_variable_slices(&[c_n.clone(), d.clone()]).expect("fresh variables");
        assert_eq!(disc.y_slices()[&c_n.id().expect("id")], vec![0..10]);
        assert_eq!(disc.y_slices()[&d.id().expect("id")], vec![10..13]);
        assert_eq!(disc.y_size(), 13);
    }

    #[test]
    fn test_process_variable_and_unknown() {
        let mut disc = Discretisation::new(mesh());
        let a = var("a", Domains::primary(["separator"]));
        disc.set_variable_slices(&[a.clone()]).expect("variable");
        let processed = disc.process_symbol(&a).expect("known");
        assert_eq!(processed.as_state_vector().map(|sv| sv.y_slices().to_vec()), Some(vec![0..3]));
        let unknown = var("b", Domains::primary(["separator"]));
        assert!(matches!(disc.process_symbol(&unknown), Err(IrError::Value(_))));
    }

    #[test]
    fn test_constant_broadcast_becomes_vector() {
        let disc = Discretisation::new(mesh());
        let b = Symbol::primary_broadcast(Symbol::scalar(2.0), ["separator"]).expect("broadcast");
        let processed = disc.process_symbol(&b).expect("constant");
        assert_eq!(
            processed.evaluate(&EvalContext::new()),
            Ok(Value::column(vec![2.0; 3]))
        );
        assert_eq!(processed.domain(), &["separator".to_string()]);
    }

    #[test]
    fn test_non_constant_broadcast() {
        let disc = Discretisation::new(mesh());
        let b = Symbol::primary_broadcast(Symbol::time(), ["separator"]).expect("broadcast");
        assert!(matches!(disc.process_symbol(&b), Err(IrError::NotImplemented(_))));
    }

    #[test]
    fn test_mixed_concatenation_evaluates() {
        let a = Symbol::from_variable(
            "a",
            Domains::primary(["negative electrode"]),
            Variable::new(),
        );
        let zero =
            Symbol::primary_broadcast(Symbol::scalar(0.0), ["separator"]).expect("broadcast");
        let concat = simplify::concatenation(vec![a.clone(), zero]).expect("disjoint");
        let mut disc = Discretisation::new(mesh());
        disc.set_variable_slices(&[a]).expect("variable");
        let processed = disc.process_symbol(&concat).expect("discretised");
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(
            processed.evaluate(&EvalContext::new().with_y(&y)),
            Ok(Value::column(vec![1.0, 2.0, 3.0, 4.0, 5.0, 0.0, 0.0, 0.0]))
        );
    }
}
