pub mod connection;
pub mod table;
