//! Leaf value providers.
pub mod num;
pub mod text;

pub use num::{date_time, number};
pub use text::{BookCache, identifier, lorem, random_string};
