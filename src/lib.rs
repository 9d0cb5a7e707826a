// src/lib.rs

//! Portfolio crawler library
//!
//! Crawls a portfolio directory and its profile pages, and publishes the
//! result as a validated static JSON tree.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
