// Copyright (c) 2021 MASSA LABS <info@massa.net>
//! Structured trace events, one `noah_trace:<event>:<json params>` line per call.

/// Emit a structured trace event.
///
/// ```
/// # use noah_logging::noah_trace;
/// noah_trace!("candidates.punish", { "height": 12, "slashed": "1000" });
/// ```
#[macro_export]
macro_rules! noah_trace {
    ($evt:expr, $params:tt) => {
        $crate::tracing::trace!("noah_trace:{}:{}", $evt, $crate::serde_json::json!($params));
    };
}

#[doc(hidden)]
pub use serde_json;
#[doc(hidden)]
pub use tracing;
