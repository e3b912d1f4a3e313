pub mod dedup;
pub mod ports;
pub mod session_pool;
pub mod usecases;

pub use dedup::*;
pub use ports::*;
pub use session_pool::*;
