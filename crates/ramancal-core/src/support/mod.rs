pub mod serialization;
pub mod tables;
