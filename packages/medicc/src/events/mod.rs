pub mod all_events;
pub mod branch;
pub mod event;
pub mod models;
