//! Storage layer for the bonsai community site.
//!
//! File uploads from every part of the site go through [`storage::Storage`],
//! which hides which backend (local disk, Azure Blob, Supabase Storage or
//! Cloudflare R2) actually holds the bytes.

pub mod app_config;
pub mod storage;
pub mod web;
