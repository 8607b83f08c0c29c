#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod prelude;

pub mod net;
