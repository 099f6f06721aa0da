pub mod api;
pub mod cli;
pub mod custody;
pub mod engine;
pub mod errors;
pub mod events;
pub mod orders;
pub mod settings;
pub mod state;
pub mod store;
pub mod trade;
pub mod utils;
