//! Kitshop API library.
//!
//! This crate provides the REST API as a library, allowing the router to be
//! tested in-process and the CLI to reuse repositories and password hashing.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
