pub mod commands;
pub mod jobs;
pub mod medicc_cli;
pub mod verbosity;
