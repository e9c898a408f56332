pub mod arango;
pub mod conf;
pub mod index;
pub mod provision;
pub mod utils;
