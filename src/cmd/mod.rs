//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `sign`   | `Sign`           |
//! | `config` | `CheckConfig`    |

pub mod config;
pub mod serve;
pub mod sign;

pub use config::cmd_check_config;
pub use serve::cmd_serve;
pub use sign::cmd_sign;
