//! Bazaar - a classifieds marketplace
//!
//! Sellers post listings with photos under a fixed category taxonomy;
//! buyers browse, filter and search them and contact the seller directly.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
