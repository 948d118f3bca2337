//! # Dayline
//!
//! A local-first importer that reconciles therapy-device, pulse-oximetry,
//! and health-API sessions into one per-day timeline.
//!
//! Import files are decoded into batches, grouped into meta-sessions, and
//! merged into the stored days they overlap. Reconciliation itself lives
//! in the `dayline-core` crate; this crate supplies configuration, the
//! SQLite store, the file decoders, and the CLI plumbing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Filesystem  │──▶│   Decoders   │──▶│  Reconcile   │──▶│  SQLite  │
//! │  JSON/CSV   │   │ ImportBatch  │   │ (one tx/run) │   │   days   │
//! └─────────────┘   └──────────────┘   └──────────────┘   └────┬─────┘
//!                                                              │
//!                                           ┌──────────────────┤
//!                                           ▼                  ▼
//!                                      ┌──────────┐       ┌──────────┐
//!                                      │   show   │       │  export  │
//!                                      └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dayline init                          # create database
//! dayline load-days device-days.json    # load therapy-device days
//! dayline import                        # merge oximetry / health-API files
//! dayline show 2024-01-01
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the day store |
//! | [`decoders`] | Import file decoders and their registry |
//! | [`oximetry_events`] | Desaturation and pulse-rate events from oximetry signals |
//! | [`connector_fs`] | Filesystem scan for import files |
//! | [`progress`] | Import progress reporting |
//! | [`import`] | Import transaction coordination |
//! | [`ingest`] | CLI import orchestration |
//! | [`sources`] | Connector and decoder listing |
//! | [`show`] | Day retrieval |
//! | [`stats`] | Database statistics |
//! | [`export`] | JSON export |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod decoders;
pub mod export;
pub mod import;
pub mod ingest;
pub mod migrate;
pub mod oximetry_events;
pub mod progress;
pub mod show;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
