//! Patient merge.
//!
//! [`MergeResolver`] decides what the surviving record holds; [`MergeCoordinator`] runs the
//! multi-step write against the stores.

mod coordinator;
mod resolver;

pub use coordinator::{MergeCoordinator, MergeRequest};
pub use resolver::{MergeResolver, MergedFields};
