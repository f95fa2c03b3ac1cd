//! Local-first memory of browsed pages: capture, recall by meaning and
//! keywords, and activity analytics, all backed by one SQLite file.

pub mod analytics;
pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod features;
pub mod ids;
pub mod index;
pub mod memory;
pub mod recall;
pub mod rules;
pub mod store;
pub mod web;

#[cfg(test)]
mod tests;
