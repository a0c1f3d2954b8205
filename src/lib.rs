#[macro_use]
extern crate diesel;

pub mod actions;
pub mod auth;
pub mod error;
pub mod marking;
pub mod models;
#[rustfmt::skip]
pub mod schema;
