#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

#[macro_use]
pub mod util;
pub mod logging;
