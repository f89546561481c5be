//! pulse-relay — real-time notification relay.
//!
//! ## Overview
//!
//! Browser clients hold a WebSocket to the relay, authenticate with an
//! opaque user id, and submit long-running jobs (product identification,
//! brand research, competitor research, prompt generation). The relay
//! forwards each submission to an external workflow engine over HTTP and,
//! when the engine calls back minutes later, fans the result out to every
//! connection the owning user has live at that moment.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐ WebSocket ┌─────────────────────────────────────────────┐
//! │ Browser  │ ────────> │  ws.rs     (socket loop, keepalive)         │
//! │ clients  │ <──────── │    └─ router.rs  (AUTH + job submissions)   │
//! └──────────┘           │         │                                   │
//!                        │         ├─ registry.rs (user → connections) │
//!                        │         ├─ jobs.rs     (pending-job stores) │
//!                        │         └─ dispatch.rs (POST to engine) ──────> workflow
//!                        │                                             │    engine
//!                        │  callback.rs (POST per kind) <──────────────────┘
//!                        │  server.rs   (Router, AppState, startup)    │
//!                        │  sweeper.rs  (stale-job reclamation)        │
//!                        └─────────────────────────────────────────────┘
//! ```
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `protocol` | Client/server frame types, `JobKind`, frame decoding    |
//! | `registry` | `ConnectionRegistry` — per-user live connection fan-out |
//! | `jobs`     | `PendingJobs` — four in-memory pending-job partitions   |
//! | `router`   | Per-connection auth state machine + message dispatch    |
//! | `dispatch` | `OutboundDispatcher` — webhook hand-off, fail-fast      |
//! | `callback` | Workflow-engine callback routes, result fan-out         |
//! | `sweeper`  | Periodic expiry of jobs that never got a callback       |
//! | `server`   | `AppState`, router assembly, startup/shutdown           |
//! | `config`   | Environment-driven `RelayConfig`                        |
//! | `errors`   | Typed dispatch errors                                   |
//!
//! Nothing is persisted: a restart drops all connection bookkeeping and job
//! tracking, by design. The browser side polls the authoritative datastore
//! as a fallback while a job is outstanding.

pub mod callback;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod jobs;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod sweeper;
pub mod ws;
