//! pvbridged - WebSocket bridge for control-system process variables
//!
//! This crate multiplexes client subscriptions onto one upstream
//! subscription per variable and fans every update out to the clients
//! watching it:
//! - `registry` - Subscription index actor (who watches what)
//! - `dispatch` - Update hand-off queue and fan-out dispatcher
//! - `server` - WebSocket server, connection handling and client sessions
//! - `provider` - Upstream variable source trait and a local implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       pvbridged                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐ commands ┌─────────────────────────┐   │
//! │  │  ClientSession  │─────────▶│     RegistryActor       │   │
//! │  │  (per client)   │          │  (subscription owner)   │   │
//! │  └──┬───────────▲──┘          └────────────▲────────────┘   │
//! │     │ 0→1 / 1→0 │ outbox                   │ subscribers    │
//! │     ▼           │                          │                │
//! │  ┌─────────────────┐  UpdateSink  ┌────────┴────────────┐   │
//! │  │   PvProvider    │─────────────▶│     Dispatcher      │   │
//! │  │  (upstream)     │  (mpsc)      │ normalize + fan-out │   │
//! │  └─────────────────┘              └─────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod provider;
pub mod registry;
pub mod server;
