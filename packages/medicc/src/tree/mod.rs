pub mod infer;
pub mod neighbor_joining;
pub mod reroot;
#[allow(clippy::module_inception)]
pub mod tree;
