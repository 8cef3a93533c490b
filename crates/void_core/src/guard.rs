//! Panic isolation for user callbacks
//!
//! Code supplied by users (render functions, lifecycle hooks, effects) runs
//! behind these guards so that one failing callback is reported as a value
//! instead of unwinding through the engine.

use std::panic::{self, AssertUnwindSafe};
use std::string::{String, ToString};

use crate::error::CallbackError;

/// Run `f`, converting a panic into a [`CallbackError`] tagged with `site`
pub fn catch_panic<F, R>(site: &'static str, f: F) -> Result<R, CallbackError>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| CallbackError::new(site, panic_message(payload.as_ref())))
}

/// Render a panic payload as text
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_panic() {
        assert_eq!(catch_panic("ok", || 42), Ok(42));

        let result: Result<i32, CallbackError> = catch_panic("on_mount", || {
            panic!("Test panic");
        });
        let err = result.unwrap_err();
        assert_eq!(err.site, "on_mount");
        assert!(err.message.contains("Test panic"));
    }

    #[test]
    fn test_formatted_panic_message() {
        let err = catch_panic("render", || -> () { panic!("bad value {}", 7) }).unwrap_err();
        assert_eq!(&*err.message, "bad value 7");
    }
}
