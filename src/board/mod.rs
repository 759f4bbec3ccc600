//! Board support layer. Only builds on the embedded target; everything in
//! here is allowed to poke registers, nothing outside it is.

pub mod rp2040;

pub use rp2040::{BoardConfig, Rp2040Board};
