//! HTTP surface.
//!
//! | Module       | Routes                                              |
//! |--------------|-----------------------------------------------------|
//! | `deploy`     | `POST /deploy`                                      |
//! | `session`    | `/api/login`, `/api/logout`                         |
//! | `api`        | `/api/sign`, `/api/logs*`, `/api/docker/*`, `/health` |
//! | `router`     | `/web/*` static files, `/` redirect, server startup |

pub mod api;
pub mod deploy;
pub mod router;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{AppState, SharedState};
pub use router::{build_router, start_server};
