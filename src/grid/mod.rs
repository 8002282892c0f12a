pub mod decode;
pub mod fetch;
pub mod layout;
pub mod slicer;
