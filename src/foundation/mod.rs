pub mod arena;
pub mod clock;
pub mod core;
pub mod error;
pub(crate) mod math;
