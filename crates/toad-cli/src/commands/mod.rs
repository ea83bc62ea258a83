pub mod claim;
pub mod common;
pub mod countdown;
pub mod mirror;
pub mod profile;
