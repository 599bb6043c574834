pub mod alphabet;
pub mod cost_model;
pub mod lattice;
pub mod med_model;
