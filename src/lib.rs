#![cfg_attr(not(test), no_std)]

//! Frame codecs for the decentralized low-voltage CAN network.
//!
//! Each vehicle board owns one state object (dash, power, HV, rear-left
//! driver, the BMS and motor-controller relays, and the instrument cluster
//! spoofer) that packs its typed fields into fixed 8-byte frames and back.
//! Physical controllers plug in behind the [`LvBus`] transport trait.

mod boards;
mod bus;
mod cluster;
mod frame;
pub mod layout;
mod relay;

pub use boards::*;
pub use bus::*;
pub use cluster::*;
pub use frame::*;
pub use relay::*;

pub use embedded_can::{ExtendedId, Id, StandardId};
