//! Kernel families built on [`Program`](crate::program::Program).

pub mod unary;

pub use unary::UnaryElementwise;
