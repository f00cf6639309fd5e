pub mod artifact;
pub mod dtype;
pub mod inspector;
pub mod render;
pub mod spec;

pub use artifact::*;
pub use dtype::*;
pub use inspector::*;
pub use spec::*;
