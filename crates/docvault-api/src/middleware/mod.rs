//! Request extractors for identity forwarded by the auth gateway, and
//! request tracing

pub mod context;
pub mod trace;
