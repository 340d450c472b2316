//! Small building blocks shared by the stages and backends.

pub mod cancel;
pub mod paths;
pub mod process;
pub mod retention;

pub use cancel::CancelToken;
pub use paths::expand_path;
pub use process::{ProcessError, RunOptions};
