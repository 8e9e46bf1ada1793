pub mod aggregate;
pub mod config;
pub mod export;
pub mod naming;
pub mod reconcile;
pub mod region;
pub mod table;
pub mod utils;
