// Installation building blocks
//
// Durable, non-database side effects of an install: the application config, the
// install lock and post-install activation.
//
// IMPORTANT:
// - Never log secrets (database or admin passwords).
// - All I/O is async.

pub mod config_store;
pub mod lock;
pub mod runtime;
