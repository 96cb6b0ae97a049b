pub mod common;
pub mod lists;
pub mod menu;
pub mod share;
pub mod sync;
