//! Keys module: modifier identities and keycode encoding
//!
//! Only the eight standard modifiers are named here; other keys are carried
//! as raw encoded usages.

mod modifiers;
pub mod usage;

pub use modifiers::{Modifier, ModifierSet};
