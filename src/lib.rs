//! # Resource Recipe
//!
//! > **A Recipe for Cached, Alias-addressed Resources in Rust.**
//!
//! This crate shows how an application is built on the generic
//! [`resource_framework`]: a keyed cache that deduplicates concurrent loads and
//! tracks per-key load state, plus a synchronous executor pipeline for ordered,
//! interruptible operations.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Why a Resource Cache + Executors?
//!
//! - **Resources**: describe *what a key means* and *how to fetch it* once
//!   ([`UsersResource`](resources::UsersResource)); the cache handles freshness,
//!   deduplication, error recording and aliases.
//! - **Executors**: express multi-stage operations as linked handler collections
//!   ([`FormPipeline`](forms::FormPipeline)), with interruption and cleanup built in.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Aliases instead of query methods
//! "All users" and "users of project 2" are keys, not methods:
//! [`all_users()`](resources::all_users) and [`project_users`](resources::project_users).
//! They are loaded, cached, outdated and paginated like any other key.
//!
//! ### 2. Type-Safe Error Handling
//! The service and the loader share [`UserError`](services::UserError). Cache failures
//! carry the loader's error, recoverable with
//! [`ResourceError::downcast_ref`](resource_framework::ResourceError::downcast_ref).
//!
//! ### 3. Concurrency Model
//! The cache is shared behind an `Arc`. Overlapping loads of the same key wait for a
//! single loader call; different keys load in parallel.
//!
//! ### 4. Observability
//! `tracing` everywhere with structured fields. See [`lifecycle::tracing`].
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Data ([`model`])
//! [`User`](model::User), [`UserForm`](model::UserForm) and their ids.
//!
//! ### 2. The Source ([`services`])
//! [`UserService`](services::UserService) and the in-memory
//! [`InMemoryUserService`](services::InMemoryUserService).
//!
//! ### 3. The Cache ([`resources`])
//! [`UsersResource`](resources::UsersResource), a `MapResource` over the service.
//!
//! ### 4. The Pipeline ([`forms`])
//! Validate → format → submit, writing through the cache and the service.
//!
//! ### 5. The Orchestrator ([`lifecycle`])
//! [`ResourceSystem`](lifecycle::ResourceSystem) wires everything from a
//! [`SystemConfig`](lifecycle::SystemConfig).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//!
//! # Run every test in the workspace
//! cargo test --workspace
//! ```

pub mod forms;
pub mod lifecycle;
pub mod model;
pub mod resources;
pub mod services;
