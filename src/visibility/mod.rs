//! Conditional visibility
//!
//! Decides, per component, whether its value participates in validation,
//! and strips the values of excluded components from a copy of the
//! document. Conditions that cannot be evaluated show the component.

mod condition;
mod resolver;

pub use condition::{check_simple, find_value};
pub use resolver::{own_visibility, resolve, VisibilityMap};
