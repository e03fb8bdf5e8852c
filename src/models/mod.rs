pub mod endpoint;
pub mod exchange;
pub mod stats;

pub use endpoint::*;
pub use exchange::*;
pub use stats::*;
