//! The architecture-map contract: translating between abstract [`IRRegister`]
//! values and concrete ISA register names.
//!
//! The concrete x86 table lives in `x86sim-vm`, since it is specific to one
//! ISA; this crate only fixes the shape every architecture map must have.

use crate::ir::IRRegister;

/// Bidirectional lookup between an [`IRRegister`] and its concrete name in a
/// particular ISA.
///
/// Lookup failure is always the caller's concern (typically surfaced as
/// [`crate::fault::SimFault::RegisterNotFound`]); implementations return
/// `None` rather than panicking.
pub trait ArchitectureMap {
    /// The concrete register name for an abstract register, e.g.
    /// `{Gpr,0,32}` → `"eax"`.
    fn name_of(&self, reg: IRRegister) -> Option<&str>;

    /// The abstract register for a concrete name, e.g. `"eax"` →
    /// `{Gpr,0,32}`.
    fn register_for(&self, name: &str) -> Option<IRRegister>;
}
