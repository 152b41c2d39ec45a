pub mod config;
pub mod envelope;
pub mod errors;
pub mod es;
pub mod normalize;
pub mod pipeline;
pub mod routing;
pub mod sigv4;
pub mod utils;

pub use utils::*;
