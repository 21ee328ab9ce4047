pub mod record;
pub mod sink;
pub mod diagnostics;
pub mod logger;

pub mod console;
pub mod noop_sink;
pub mod transport;
pub mod tcp_sink;

#[cfg(feature = "middleware")]
pub mod middleware;

pub mod layer;
pub mod init;
pub mod env;
pub mod backend;

pub use diagnostics::Diagnostics;
pub use logger::{Logger, LoggerBuilder};
pub use record::{Fields, Level, LogRecord};
pub use sink::LogSink;
