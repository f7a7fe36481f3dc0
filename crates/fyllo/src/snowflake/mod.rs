mod engine;
mod identity;
mod layout;
mod sequencer;
#[cfg(test)]
mod tests;

pub use engine::*;
pub use identity::*;
pub use layout::*;
pub use sequencer::*;
