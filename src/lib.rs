#[macro_use]
extern crate rocket;

pub mod api;
pub mod background;
pub mod common;
pub mod config;
pub mod database;
pub mod pipeline;
pub mod service;
pub mod storage;
