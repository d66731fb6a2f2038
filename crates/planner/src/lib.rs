//! Plan compilation stack for DFQ.
//!
//! Architecture role:
//! - relational-algebra operator tokens and expression-argument helpers
//! - the plan-tree model and the logical-to-distributed rewrite
//! - the graph builder that instantiates kernels and chooses per-edge
//!   cache policies
//!
//! Key modules:
//! - [`algebra`]
//! - [`rewriter`]
//! - [`builder`]

pub mod algebra;
pub mod builder;
pub mod rewriter;

pub use algebra::leading_operator;
pub use builder::{GraphBuilder, TableBinding, TreeNode, explain_tree};
pub use rewriter::{PlanNode, rewrite_plan};
