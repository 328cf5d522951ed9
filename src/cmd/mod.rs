//! CLI command implementations.
//!
//! | Module     | Commands handled   |
//! |------------|--------------------|
//! | `run`      | `Run`              |
//! | `scan`     | `Scan`             |
//! | `queue`    | `Queue`            |
//! | `sessions` | `Sessions`         |
//! | `config`   | `Config`           |

pub mod config;
pub mod queue;
pub mod run;
pub mod scan;
pub mod sessions;

pub use config::cmd_config;
pub use queue::cmd_queue;
pub use run::cmd_run;
pub use scan::cmd_scan;
pub use sessions::cmd_sessions;
