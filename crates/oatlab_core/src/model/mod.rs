//! Model-side types: quantity references, the model collaborator trait, and
//! the linear reference model.

mod backend;
pub mod linear;
mod reference;

pub use backend::*;
pub use linear::{LinearModel, LinearModelError, LinearVariant};
pub use reference::*;
