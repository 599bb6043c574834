pub mod engine;
pub mod pairwise;
pub mod shorten;
