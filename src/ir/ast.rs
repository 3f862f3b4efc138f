//! Symbolic expression tree.
//!
//! A [`Symbol`] owns its children exclusively; trees are never mutated after
//! construction. Transformations (simplification, differentiation,
//! discretisation) always build new nodes. The node set is deliberately
//! small: just enough leaves and operators for concatenations to be built,
//! evaluated, differentiated and discretised.

use crate::ir::concatenation::Concatenation;
use crate::ir::domain::Domains;
use crate::ir::error::{IrError, Result};
use crate::ir::repr_visitor::ReprVisitor;
use crate::ir::value::Value;
use crate::ir::visitor::{Visitable, Visitor};
use ndarray::Array2;
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Identifiers and evaluation context
// =============================================================================

/// Stable identity of a variable or input parameter.
///
/// Ids survive `new_copy` and discretisation, so downstream maps (variable
/// slices, input bindings) never key on display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(u64);

impl SymbolId {
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SymbolId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Values bound to input parameters.
pub type Inputs = OrderMap<SymbolId, f64>;

/// Everything a node may read while evaluating.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub t: Option<f64>,
    pub y: Option<&'a [f64]>,
    pub y_dot: Option<&'a [f64]>,
    pub inputs: Option<&'a Inputs>,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_t(mut self, t: f64) -> Self {
        self.t = Some(t);
        self
    }

    pub fn with_y(mut self, y: &'a [f64]) -> Self {
        self.y = Some(y);
        self
    }

    pub fn with_y_dot(mut self, y_dot: &'a [f64]) -> Self {
        self.y_dot = Some(y_dot);
        self
    }

    pub fn with_inputs(mut self, inputs: &'a Inputs) -> Self {
        self.inputs = Some(inputs);
        self
    }
}

// =============================================================================
// Leaf payloads
// =============================================================================

/// Contiguous reads from the solver state vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    y_slices: Vec<Range<usize>>,
    evaluation_array: Vec<bool>,
}

impl StateVector {
    pub fn new(y_slices: Vec<Range<usize>>) -> Result<Self> {
        if y_slices.is_empty() {
            return Err(IrError::Value(
                "state vector needs at least one slice".to_string(),
            ));
        }
        if let Some(bad) = y_slices.iter().find(|s| s.start > s.end) {
            return Err(IrError::Value(format!("invalid state vector slice {:?}", bad)));
        }
        let len = y_slices.iter().map(|s| s.end).max().unwrap_or(0);
        let mut evaluation_array = vec![false; len];
        for slice in &y_slices {
            evaluation_array[slice.clone()].iter_mut().for_each(|e| *e = true);
        }
        Ok(Self {
            y_slices,
            evaluation_array,
        })
    }

    pub fn y_slices(&self) -> &[Range<usize>] {
        &self.y_slices
    }

    /// Indicator over `[0, last stop)` of the entries this node reads.
    pub fn evaluation_array(&self) -> &[bool] {
        &self.evaluation_array
    }

    pub fn size(&self) -> usize {
        self.evaluation_array.iter().filter(|e| **e).count()
    }

    pub fn first_start(&self) -> usize {
        self.y_slices.first().map(|s| s.start).unwrap_or(0)
    }

    pub fn last_stop(&self) -> usize {
        self.y_slices.last().map(|s| s.end).unwrap_or(0)
    }

    fn evaluate(&self, y: Option<&[f64]>) -> Result<Value> {
        let y = y.ok_or_else(|| {
            IrError::Value("StateVector cannot evaluate input 'y=None'".to_string())
        })?;
        if y.len() < self.evaluation_array.len() {
            return Err(IrError::Shape(format!(
                "y is too short: length {} but state vector reads up to {}",
                y.len(),
                self.evaluation_array.len()
            )));
        }
        let picked = self
            .evaluation_array
            .iter()
            .zip(y)
            .filter(|(keep, _)| **keep)
            .map(|(_, v)| *v)
            .collect();
        Ok(Value::column(picked))
    }
}

/// Metadata carried by a model variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: SymbolId,
    pub scale: f64,
    pub reference: f64,
    pub bounds: (f64, f64),
    pub print_name: Option<String>,
}

impl Variable {
    pub fn new() -> Self {
        Self {
            id: SymbolId::fresh(),
            scale: 1.0,
            reference: 0.0,
            bounds: (f64::NEG_INFINITY, f64::INFINITY),
            print_name: None,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_reference(mut self, reference: f64) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = (lower, upper);
        self
    }

    pub fn with_print_name(mut self, print_name: &str) -> Self {
        self.print_name = Some(print_name.to_string());
        self
    }
}

impl Default for Variable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    /// Repeat along a new primary domain; the child's domains move up a level.
    Primary,
    /// Spread a domain-less child over a full domain descriptor.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Multiply,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Multiply => "*",
        }
    }

    pub fn apply(&self, left: &Value, right: &Value) -> Result<Value> {
        match self {
            BinaryOp::Add => left.add(right),
            BinaryOp::Multiply => left.mul(right),
        }
    }
}

// =============================================================================
// Symbol
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Scalar(f64),
    Vector(Array2<f64>),
    Matrix(Value),
    StateVector(StateVector),
    Variable(Variable),
    InputParameter(SymbolId),
    Time,
    Broadcast {
        kind: BroadcastKind,
        child: Box<Symbol>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Symbol>,
        right: Box<Symbol>,
    },
    Index {
        child: Box<Symbol>,
        rows: Range<usize>,
    },
    Concatenation(Concatenation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    name: String,
    domains: Domains,
    kind: SymbolKind,
}

impl Symbol {
    pub(crate) fn from_parts(name: &str, domains: Domains, kind: SymbolKind) -> Self {
        Self {
            name: name.to_string(),
            domains,
            kind,
        }
    }

    pub fn scalar(value: f64) -> Symbol {
        Symbol::from_parts(&value.to_string(), Domains::default(), SymbolKind::Scalar(value))
    }

    pub fn vector(values: Vec<f64>) -> Symbol {
        Symbol::vector_on(values, Domains::default())
    }

    pub fn vector_on(values: Vec<f64>, domains: Domains) -> Symbol {
        let n = values.len();
        let column = Array2::from_shape_vec((n, 1), values)
            .unwrap_or_else(|_| Array2::zeros((n, 1)));
        Symbol::from_parts("vector", domains, SymbolKind::Vector(column))
    }

    pub(crate) fn column(column: Array2<f64>, domains: Domains) -> Symbol {
        Symbol::from_parts("vector", domains, SymbolKind::Vector(column))
    }

    pub fn matrix(value: Value) -> Result<Symbol> {
        if value.is_scalar() {
            return Err(IrError::Type("a matrix must be two-dimensional".to_string()));
        }
        Ok(Symbol::from_parts("matrix", Domains::default(), SymbolKind::Matrix(value)))
    }

    pub fn state_vector(y_slices: Vec<Range<usize>>) -> Result<Symbol> {
        Symbol::state_vector_on(y_slices, Domains::default())
    }

    pub fn state_vector_on(y_slices: Vec<Range<usize>>, domains: Domains) -> Result<Symbol> {
        let sv = StateVector::new(y_slices)?;
        let name = sv
            .y_slices()
            .iter()
            .map(|s| format!("y[{}:{}]", s.start, s.end))
            .collect::<Vec<_>>()
            .join(",");
        Ok(Symbol::from_parts(&name, domains, SymbolKind::StateVector(sv)))
    }

    pub fn variable(name: &str, domains: Domains) -> Symbol {
        Symbol::from_variable(name, domains, Variable::new())
    }

    pub fn from_variable(name: &str, domains: Domains, variable: Variable) -> Symbol {
        Symbol::from_parts(name, domains, SymbolKind::Variable(variable))
    }

    pub fn input_parameter(name: &str) -> Symbol {
        Symbol::from_parts(name, Domains::default(), SymbolKind::InputParameter(SymbolId::fresh()))
    }

    pub fn time() -> Symbol {
        Symbol::from_parts("time", Domains::default(), SymbolKind::Time)
    }

    /// Broadcast `child` onto the primary domains `domain`.
    pub fn primary_broadcast<S: Into<String>>(
        child: Symbol,
        domain: impl IntoIterator<Item = S>,
    ) -> Result<Symbol> {
        let primary: Vec<String> = domain.into_iter().map(Into::into).collect();
        if primary.is_empty() {
            return Err(IrError::Domain(
                "cannot broadcast onto an empty domain".to_string(),
            ));
        }
        let domains = child.domains.shifted_up(primary)?;
        Ok(Symbol::from_parts(
            "broadcast",
            domains,
            SymbolKind::Broadcast {
                kind: BroadcastKind::Primary,
                child: Box::new(child),
            },
        ))
    }

    /// Broadcast a domain-less `child` onto a full domain descriptor.
    pub fn full_broadcast(child: Symbol, domains: Domains) -> Result<Symbol> {
        if !child.domains.primary.is_empty() {
            return Err(IrError::Domain(format!(
                "cannot fully broadcast '{}' which already lives on {:?}",
                child, child.domains.primary
            )));
        }
        if domains.primary.is_empty() {
            return Err(IrError::Domain(
                "cannot broadcast onto an empty domain".to_string(),
            ));
        }
        Ok(Symbol::from_parts(
            "broadcast",
            domains,
            SymbolKind::Broadcast {
                kind: BroadcastKind::Full,
                child: Box::new(child),
            },
        ))
    }

    /// Unsimplified binary node; see `transform::simplify::{add, multiply}`.
    pub fn binary(op: BinaryOp, left: Symbol, right: Symbol) -> Result<Symbol> {
        let domains = Domains::merge_binary(&left.domains, &right.domains)?;
        Ok(Symbol::from_parts(
            op.symbol(),
            domains,
            SymbolKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        ))
    }

    /// Rows `[start, end)` of `child`.
    pub fn index(child: Symbol, rows: Range<usize>) -> Result<Symbol> {
        if rows.start > rows.end {
            return Err(IrError::Value(format!("invalid index range {:?}", rows)));
        }
        let name = format!("index[{}:{}]", rows.start, rows.end);
        Ok(Symbol::from_parts(
            &name,
            Domains::default(),
            SymbolKind::Index {
                child: Box::new(child),
                rows,
            },
        ))
    }

    // -------------------------------------------------------------------------
    // Accessors

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domains(&self) -> &Domains {
        &self.domains
    }

    /// Primary domain.
    pub fn domain(&self) -> &[String] {
        &self.domains.primary
    }

    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    pub fn children(&self) -> Vec<&Symbol> {
        match &self.kind {
            SymbolKind::Broadcast { child, .. } | SymbolKind::Index { child, .. } => {
                vec![child.as_ref()]
            }
            SymbolKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            SymbolKind::Concatenation(concat) => concat.children().iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            SymbolKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_state_vector(&self) -> Option<&StateVector> {
        match &self.kind {
            SymbolKind::StateVector(sv) => Some(sv),
            _ => None,
        }
    }

    pub fn as_concatenation(&self) -> Option<&Concatenation> {
        match &self.kind {
            SymbolKind::Concatenation(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.as_variable().is_some()
    }

    /// The broadcast child, if this is a broadcast.
    pub fn broadcast_child(&self) -> Option<(BroadcastKind, &Symbol)> {
        match &self.kind {
            SymbolKind::Broadcast { kind, child } => Some((*kind, child.as_ref())),
            _ => None,
        }
    }

    /// Id of a variable or input parameter.
    pub fn id(&self) -> Option<SymbolId> {
        match &self.kind {
            SymbolKind::Variable(v) => Some(v.id),
            SymbolKind::InputParameter(id) => Some(*id),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Evaluation

    pub fn evaluate(&self, ctx: &EvalContext) -> Result<Value> {
        match &self.kind {
            SymbolKind::Scalar(v) => Ok(Value::Scalar(*v)),
            SymbolKind::Vector(a) => Ok(Value::Dense(a.clone())),
            SymbolKind::Matrix(m) => Ok(m.clone()),
            SymbolKind::StateVector(sv) => sv.evaluate(ctx.y),
            SymbolKind::Variable(_) => Err(IrError::NotImplemented(format!(
                "variable '{}' must be discretised before it can be evaluated",
                self.name
            ))),
            SymbolKind::InputParameter(id) => ctx
                .inputs
                .and_then(|inputs| inputs.get(id))
                .map(|v| Value::Scalar(*v))
                .ok_or_else(|| IrError::Value(format!("input '{}' not found", self.name))),
            SymbolKind::Time => ctx
                .t
                .map(Value::Scalar)
                .ok_or_else(|| IrError::Value("t must be provided".to_string())),
            SymbolKind::Broadcast { .. } => Err(IrError::NotImplemented(format!(
                "broadcast '{}' must be discretised before it can be evaluated",
                self
            ))),
            SymbolKind::Binary { op, left, right } => {
                op.apply(&left.evaluate(ctx)?, &right.evaluate(ctx)?)
            }
            SymbolKind::Index { child, rows } => child.evaluate(ctx)?.rows(rows.clone()),
            SymbolKind::Concatenation(concat) => concat.evaluate(ctx),
        }
    }

    /// Evaluate with placeholder data to learn the result's shape and
    /// storage (dense or sparse) without a state vector.
    pub fn evaluate_for_shape(&self) -> Result<Value> {
        match &self.kind {
            SymbolKind::Scalar(v) => Ok(Value::Scalar(*v)),
            SymbolKind::Vector(a) => Ok(Value::Dense(a.clone())),
            SymbolKind::Matrix(m) => Ok(m.clone()),
            SymbolKind::StateVector(sv) => Ok(Value::column(vec![f64::NAN; sv.size()])),
            SymbolKind::InputParameter(_) | SymbolKind::Time => Ok(Value::Scalar(f64::NAN)),
            SymbolKind::Variable(_) | SymbolKind::Broadcast { .. } => {
                Err(IrError::NotImplemented(format!(
                    "shape of '{}' is only known after discretisation",
                    self
                )))
            }
            SymbolKind::Binary { op, left, right } => {
                op.apply(&left.evaluate_for_shape()?, &right.evaluate_for_shape()?)
            }
            SymbolKind::Index { child, rows } => child.evaluate_for_shape()?.rows(rows.clone()),
            SymbolKind::Concatenation(concat) => concat.evaluate_for_shape(),
        }
    }

    pub fn evaluates_to_number(&self) -> bool {
        matches!(self.evaluate_for_shape(), Ok(Value::Scalar(_)))
    }

    pub fn is_constant(&self) -> bool {
        match &self.kind {
            SymbolKind::Scalar(_) | SymbolKind::Vector(_) | SymbolKind::Matrix(_) => true,
            SymbolKind::StateVector(_)
            | SymbolKind::Variable(_)
            | SymbolKind::InputParameter(_)
            | SymbolKind::Time => false,
            SymbolKind::Concatenation(concat) => concat.is_constant(),
            _ => self.children().iter().all(|child| child.is_constant()),
        }
    }

    // -------------------------------------------------------------------------
    // Copying

    /// Structurally identical tree with freshly built children.
    ///
    /// Concatenations are rebuilt through their simplifying constructors, so
    /// `new_copy` doubles as the simplification pass.
    pub fn new_copy(&self) -> Result<Symbol> {
        match &self.kind {
            SymbolKind::Broadcast { kind, child } => {
                let child = child.new_copy()?;
                match kind {
                    BroadcastKind::Primary => {
                        Symbol::primary_broadcast(child, self.domains.primary.clone())
                    }
                    BroadcastKind::Full => Symbol::full_broadcast(child, self.domains.clone()),
                }
            }
            SymbolKind::Binary { op, left, right } => {
                crate::ir::transform::simplify::binary(*op, left.new_copy()?, right.new_copy()?)
            }
            SymbolKind::Index { child, rows } => Symbol::index(child.new_copy()?, rows.clone()),
            SymbolKind::Concatenation(concat) => concat.new_copy(),
            _ => Ok(self.clone()),
        }
    }

    /// Every node of the tree, parents before children.
    pub fn pre_order(&self) -> Vec<&Symbol> {
        struct Collector<'s> {
            nodes: Vec<&'s Symbol>,
        }
        impl<'s> Visitor<'s> for Collector<'s> {
            fn enter_symbol(&mut self, symbol: &'s Symbol) {
                self.nodes.push(symbol);
            }
        }
        let mut collector = Collector { nodes: Vec::new() };
        self.accept(&mut collector);
        collector.nodes
    }

    /// True if `target` occurs anywhere in this tree.
    pub fn has_symbol(&self, target: &Symbol) -> bool {
        self.pre_order().into_iter().any(|node| node == target)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut repr = ReprVisitor::default();
        self.accept(&mut repr);
        f.write_str(repr.repr().unwrap_or(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::domain::DomainLevel;

    #[test]
    fn test_state_vector_evaluation_array() {
        let sv = StateVector::new(vec![0..2, 4..5]).expect("valid slices");
        assert_eq!(sv.evaluation_array(), &[true, true, false, false, true]);
        assert_eq!(sv.size(), 3);
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sv.evaluate(Some(&y[..])), Ok(Value::column(vec![1.0, 2.0, 5.0])));
    }

    #[test]
    fn test_state_vector_requires_y() {
        let sv = Symbol::state_vector(vec![0..3]).expect("valid slices");
        let err = sv.evaluate(&EvalContext::new()).unwrap_err();
        assert!(matches!(err, IrError::Value(_)));
        assert!(Symbol::state_vector(vec![]).is_err());
    }

    #[test]
    fn test_variable_cannot_evaluate() {
        let v = Symbol::variable("c", Domains::primary(["separator"]));
        let err = v.evaluate(&EvalContext::new()).unwrap_err();
        assert!(matches!(err, IrError::NotImplemented(_)));
        assert!(!v.is_constant());
    }

    #[test]
    fn test_input_parameter_binding() {
        let p = Symbol::input_parameter("current");
        let mut inputs = Inputs::new();
        inputs.insert(p.id().expect("input has id"), 2.5);
        let ctx = EvalContext::new().with_inputs(&inputs);
        assert_eq!(p.evaluate(&ctx), Ok(Value::Scalar(2.5)));
        assert!(p.evaluate(&EvalContext::new()).is_err());
    }

    #[test]
    fn test_binary_domains() {
        let a = Symbol::variable("a", Domains::primary(["separator"]));
        let sum =
            Symbol::binary(BinaryOp::Add, a.clone(), Symbol::scalar(1.0)).expect("scalar side");
        assert_eq!(sum.domain(), &["separator".to_string()]);
        let b = Symbol::variable("b", Domains::primary(["negative electrode"]));
        assert!(Symbol::binary(BinaryOp::Add, a, b).is_err());
    }

    #[test]
    fn test_primary_broadcast_shifts_domains() {
        let c = Symbol::variable("c", Domains::primary(["negative electrode"]));
        let b = Symbol::primary_broadcast(c, ["negative particle"]).expect("broadcast");
        assert_eq!(b.domains().primary, vec!["negative particle"]);
        assert_eq!(b.domains().get(DomainLevel::Secondary), &["negative electrode".to_string()]);
    }

    #[test]
    fn test_full_broadcast_requires_domainless_child() {
        let c = Symbol::variable("c", Domains::primary(["separator"]));
        assert!(Symbol::full_broadcast(c, Domains::primary(["separator"])).is_err());
    }

    #[test]
    fn test_index_and_shape() {
        let sv = Symbol::state_vector(vec![0..5]).expect("valid slices");
        let idx = Symbol::index(sv, 1..3).expect("valid range");
        assert_eq!(idx.evaluate_for_shape().map(|v| v.shape()), Ok((2, 1)));
        let y = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ctx = EvalContext::new().with_y(&y);
        assert_eq!(idx.evaluate(&ctx), Ok(Value::column(vec![1.0, 2.0])));
    }

    #[test]
    fn test_has_symbol() {
        let a = Symbol::variable("a", Domains::default());
        let b = Symbol::variable("b", Domains::default());
        let expr = Symbol::binary(BinaryOp::Multiply, a.clone(), Symbol::scalar(2.0)).expect("ok");
        assert!(expr.has_symbol(&a));
        assert!(!expr.has_symbol(&b));
        assert_eq!(expr.pre_order().len(), 3);
    }
}
