//! Profiling support via Tracy.
//!
//! Instrumentation is enabled with the `profiling` Cargo feature:
//!
//! ```toml
//! [dependencies]
//! tessera-core = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! Run the application, then attach the [Tracy
//! profiler](https://github.com/wolfpld/tracy) to it. When the feature is
//! disabled (the default), every macro compiles to a no-op with zero
//! runtime overhead.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, Span, frame_mark as tracy_frame_mark, span};

/// Create a profiling span for the current scope.
///
/// The span automatically ends when the scope exits. The name must be a
/// string literal; use [`profile_scope_dynamic!`] for runtime names.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span with a runtime-determined name.
///
/// Accepts any `&str` expression at the cost of a heap-allocated span name.
/// Prefer [`profile_scope!`] for static names.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope_dynamic {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|c| c.span_alloc(Some($name), "", file!(), line!(), 0));
    };
}

/// Create a profiling span with a dynamic name (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope_dynamic {
    ($name:expr) => {
        let _ = $name;
    };
}

/// Mark the end of a frame for Tracy's frame analysis.
///
/// Call once per frame, typically right after the frame's work completes.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Set the name of the current thread for Tracy.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! set_thread_name {
    ($name:expr) => {
        $crate::profiling::tracy_client::set_thread_name!($name)
    };
}

/// Set thread name (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! set_thread_name {
    ($name:expr) => {};
}

// Re-export macros at module level
pub use frame_mark;
pub use profile_scope;
pub use profile_scope_dynamic;
pub use set_thread_name;
