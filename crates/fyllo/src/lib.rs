#![doc = include_str!("../README.md")]

mod args;
mod error;
mod random;
mod registry;
mod result;
mod segment;
mod snowflake;
mod time;

pub use crate::args::split_key_values;
pub use crate::error::*;
pub use crate::random::*;
pub use crate::registry::*;
pub use crate::result::*;
pub use crate::segment::*;
pub use crate::snowflake::*;
pub use crate::time::*;
