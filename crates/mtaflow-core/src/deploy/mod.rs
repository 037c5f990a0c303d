//! Dependency-ordered iteration over the deployment graph.

pub mod resolver;
pub mod steps;
