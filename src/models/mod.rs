//! Domain types shared by the API and services layers.

mod background;
mod face;

pub use background::*;
pub use face::*;
