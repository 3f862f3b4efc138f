pub mod ast;
pub mod concatenation;
pub mod domain;
pub mod error;
pub mod repr_visitor;
pub mod structural;
pub mod transform;
pub mod value;
pub mod visitor;
