pub mod compress;
pub mod squeeze;
