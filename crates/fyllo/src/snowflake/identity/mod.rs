mod elected;
#[cfg(feature = "etcd")]
mod etcd;
mod fixed;
mod interface;
#[cfg(test)]
mod tests;

pub use elected::*;
#[cfg(feature = "etcd")]
pub use etcd::*;
pub use fixed::*;
pub use interface::*;
