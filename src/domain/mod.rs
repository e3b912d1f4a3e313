pub mod types;
pub mod target;
pub mod item;
pub mod policy;

pub use types::*;
pub use target::*;
pub use item::*;
pub use policy::*;
