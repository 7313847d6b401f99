pub mod mapping;
pub mod method;
pub mod table;
