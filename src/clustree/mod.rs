pub mod kernel;
pub mod tree;

pub use kernel::ClusterKernel;
pub use tree::{ClusTree, Entry, NodeId};
