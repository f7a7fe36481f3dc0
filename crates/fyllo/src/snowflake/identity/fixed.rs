use crate::{Error, Identifier, MAX_MACHINE, Result};

/// A machine id fixed at construction.
///
/// # Example
///
/// ```
/// use fyllo::{FixedIdentifier, Identifier};
///
/// let id = FixedIdentifier::from_args("7").unwrap();
/// assert_eq!(id.identify(), 7);
///
/// assert!(FixedIdentifier::from_args("16").is_err());
/// assert!(FixedIdentifier::from_args("one").is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedIdentifier {
    machine: u64,
}

impl FixedIdentifier {
    pub fn new(machine: u64) -> Result<Self> {
        if machine >= MAX_MACHINE {
            return Err(Error::config(format!(
                "machine id [{machine}] should be in range [0, {MAX_MACHINE})"
            )));
        }
        Ok(Self { machine })
    }

    /// Parses the argument string of the `static` provider: a single integer.
    pub fn from_args(args: &str) -> Result<Self> {
        let machine = args.trim().parse::<u64>().map_err(|e| {
            Error::config(format!("machine id [{args}] is not an integer: {e}"))
        })?;
        Self::new(machine)
    }
}

impl Identifier for FixedIdentifier {
    fn identify(&self) -> u64 {
        self.machine
    }
}
