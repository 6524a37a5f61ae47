use std::fmt;

/// Something a task body left open on its worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeakedResource {
    OpenTransaction,
    Other(String),
}

impl fmt::Display for LeakedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakedResource::OpenTransaction => write!(f, "an open transaction"),
            LeakedResource::Other(what) => write!(f, "{}", what),
        }
    }
}

/// Brackets each task body with host thread-local setup and teardown.
///
/// `pre_call` runs on the worker thread before the body, `post_call` after it
/// whether or not it succeeded. Anything `post_call` reports is logged as an
/// error against the task; the task still counts as finished.
pub trait ThreadLocalHook: Send + Sync {
    fn pre_call(&self, _user_name: Option<&str>) {}

    fn post_call(&self) -> Vec<LeakedResource> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopThreadLocalHook;

impl ThreadLocalHook for NoopThreadLocalHook {}
