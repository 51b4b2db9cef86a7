#![doc = "bundle-sync-core: keeps a published content bundle in sync on local disk and serves lookups over its tree."]

//! This crate holds all domain logic for bundle-sync. The CLI crate only adds
//! configuration loading and command routing on top.
//!
//! # Modules
//! - [`metadata`]: latest-publish lookup and [`metadata::BundleInfo`]
//! - [`fetch`]: archive download
//! - [`archive`]: gunzip, untar and the staged bundle directory replace
//! - [`cache_store`]: persisted bundle state
//! - [`synchronise`]: the orchestrating [`synchronise::BundleSynchronizer`]
//! - [`tree`]: manifest parsing and identifier lookup
//! - [`resolver`] / [`library`]: local path resolution and gated read access
//! - [`contract`]: the `Transport` and `CacheStore` seams
//!
//! # Usage
//! Build an [`transport::HttpTransport`], a [`cache_store::FileCacheStore`] and a
//! [`library::ContentLibrary`], then call
//! [`synchronise::BundleSynchronizer::sync`].

pub mod archive;
pub mod cache_store;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod library;
pub mod metadata;
pub mod resolver;
pub mod synchronise;
pub mod transport;
pub mod tree;
