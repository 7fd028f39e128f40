//! Verso: a small self-hosted journal.
//!
//! Authors publish posts, optionally filed under a group, readers comment,
//! and every user can follow authors to assemble a personal feed. The
//! global index is served through a short-lived page cache; everything
//! else reads straight through to storage.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
