//! Site Sync - shared configuration service for a site admin dashboard
//!
//! Every editor panel (hero slides, services, navigation, SEO, footer, ...)
//! reads and writes one site-configuration document. This crate keeps that
//! document consistent:
//! - cache-first startup from a local sled slot
//! - background refresh merged shallowly over compiled-in defaults
//! - optimistic saves with fire-and-forget remote writes
//! - an axum admin API with SSE change notifications and media uploads

pub mod api;
pub mod blob;
pub mod cache;
pub mod config;
pub mod document;
pub mod notify;
pub mod remote;
pub mod storage;
pub mod sync;

pub use document::{Document, SiteConfig};
pub use sync::{ConfigSync, RefreshOutcome, SyncEvent, SyncOptions};
