//! Library to run a daily backup of a host.
//!
//! One run dumps the configured MySQL/MariaDB databases, bundles the dumps
//! together with static paths into a [borg] archive, prunes old archives,
//! mirrors the repository with [rclone] and finally pushes a notification.
//! Every step except loading the configuration is optional.
//!
//! The external tools are abstracted in [`backends`], the step logic lives in
//! [`stages`] and the [`pipeline`] sequences them.
//!
//! [borg]: https://borgbackup.readthedocs.io/
//! [rclone]: https://rclone.org/

#![forbid(unsafe_code)]

pub mod backends;
pub mod cli;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod stages;
pub mod util;
