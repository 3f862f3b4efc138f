pub mod diff;
pub mod jacobian;
pub mod simplify;
