//! Domain model: steps, state, and events

pub mod events;
pub mod state;
pub mod step;
