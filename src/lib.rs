use std::sync::Once;

pub mod ir;
pub mod mesh;

pub use ir::ast::{EvalContext, Inputs, Symbol, SymbolId, Variable};
pub use ir::concatenation::{sparse_stack, DomainLayout};
pub use ir::domain::{DomainLevel, Domains};
pub use ir::error::{ErrorKind, IrError};
pub use ir::structural::discretisation::Discretisation;
pub use ir::transform::simplify::{concatenation, domain_concatenation, numpy_concatenation};
pub use ir::value::Value;
pub use mesh::Mesh;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::init();
    });
}
