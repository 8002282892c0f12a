pub mod batch;
pub mod registry;
