//! Registry of shadow classes
//!
//! A [`ShadowClass`] describes replacement logic for some methods of a real class, along with
//! the [`ShadowInfo`] saying which class it shadows, at which platform versions, and what happens
//! to methods it does not implement. Shadows are grouped into [`ShadowProvider`]s and combined
//! into an immutable [`ShadowMap`]. Registries are swapped wholesale between tests, and
//! [`ShadowMap::diff`] says which real classes need their dispatch bindings recomputed.

mod class;
mod info;
mod map;

pub use class::*;
pub use info::*;
pub use map::*;
