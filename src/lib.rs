pub mod adapters;
pub mod backend;
pub mod cmd;
pub mod db;
pub mod gate;
pub mod pubsub;
pub mod utils;
