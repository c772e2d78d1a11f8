//! Console backends, one per supported board.

#[cfg(feature = "qvirt")]
pub mod pl011;
