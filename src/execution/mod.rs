pub mod edge;
pub mod filter;
pub mod odds;
