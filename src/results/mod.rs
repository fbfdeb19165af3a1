pub mod collection;
pub mod join;
pub mod keyed;
