pub use array_helper::*;

pub mod array_helper;
