pub mod csv;
pub mod file;
pub mod fs;
pub mod input;
pub mod nwk;
pub mod output;
