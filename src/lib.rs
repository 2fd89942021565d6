//! Surgemart - Flash-Sale Purchase Engine
//!
//! A backend that takes a surge of concurrent purchase requests for a single
//! scarce product and guarantees two rules under arbitrary contention: at
//! most one confirmed purchase per user, and no overselling of stock.
//!
//! # Modules
//!
//! - [`config`] - Environment-sourced configuration
//! - [`models`] - Domain types (users, products, stock, sales, orders, jobs)
//! - [`error`] - Rejection reasons, terminal failure reasons, engine errors
//! - [`store`] - PostgreSQL repositories and schema bootstrap
//! - [`cache`] - Purchase-status and sale-status projections
//! - [`queue`] - Durable job queue (memory and postgres backends)
//! - [`admission`] - Purchase admission: validate, dedupe, enqueue
//! - [`worker`] - The stock-decrement-and-order-insert critical section
//! - [`projection`] - Sale status read model and admin sale lifecycle
//! - [`stats`] - Admin statistics aggregation
//! - [`auth`] - Passwordless login, JWT issue/verify, route guards
//! - [`gateway`] - Axum HTTP surface

pub mod admission;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod projection;
pub mod queue;
pub mod stats;
pub mod store;
pub mod worker;

// Convenient re-exports at crate root
pub use admission::{AdmissionService, AdmissionTicket};
pub use cache::{SaleStatusCache, StatusCache};
pub use config::AppConfig;
pub use error::{EngineError, FailureReason, RejectReason};
pub use models::{FlashSale, JobOutcome, JobStatus, Order, Product, SaleStatus, Stock, User};
pub use projection::{SaleAdmin, SaleProjection, SaleStatusView};
pub use queue::{JobQueue, QueueBackend, build_queue};
pub use stats::StatsService;
pub use worker::PurchaseWorker;
