//! Emporium Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.
//!
//! The heart of it is [`cart`]: a cart that lives in the visitor's session
//! while they browse as a guest and in `PostgreSQL` once they sign in, with
//! the guest cart merged into the user cart at sign-in.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod state;
