mod engine;
mod interface;
mod mem;
#[cfg(feature = "postgres")]
mod sql;

pub use engine::*;
pub use interface::*;
pub use mem::*;
#[cfg(feature = "postgres")]
pub use sql::*;
