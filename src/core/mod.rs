//! Core deterministic primitives.
//!
//! Everything random in the game flows through [`DeterministicRng`], so a
//! session seed fully determines its sequence of orders.

pub mod rng;

pub use rng::DeterministicRng;
