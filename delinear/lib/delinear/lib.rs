extern crate delinear_macros;
extern crate petgraph;
extern crate static_assertions;

pub mod access;
pub mod analysis;
pub mod driver;
pub mod error;
pub mod fileformat;
pub mod ir;
pub mod support;

#[cfg(test)]
pub(crate) mod tests;
