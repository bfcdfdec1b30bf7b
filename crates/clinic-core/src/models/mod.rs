//! Domain models for the clinic intake system.

mod case;
mod role;
mod slip;
mod triage;
mod visit;
mod vitals;

pub use case::*;
pub use role::*;
pub use slip::*;
pub use triage::*;
pub use visit::*;
pub use vitals::*;

/// Last `n` characters of an id, for display.
pub fn id_suffix(id: &str, n: usize) -> String {
    let skip = id.chars().count().saturating_sub(n);
    id.chars().skip(skip).collect()
}
