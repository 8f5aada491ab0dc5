//! `territoria_core`: the deterministic, tick-driven territory economy
//! simulation core. See `src/core` for the component map.

pub mod core;
