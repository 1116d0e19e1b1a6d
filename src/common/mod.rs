pub mod compress;
pub mod path;
pub mod types;
