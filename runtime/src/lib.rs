//! # Unflow Runtime
//!
//! Runtime implementation for the unflow architecture.
//!
//! This crate provides the [`Store`]: the reducer loop that owns a feature's
//! state, reduces actions, and interprets the returned effects. It keeps the
//! task registry that enforces at most one running task per cancellation id.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, reduces actions, interprets effects
//! - **Task Registry**: Maps cancellation ids to the task occupying the slot
//! - **`StoreConfig`**: Broadcast capacity, shutdown timeout, dispatch depth
//!
//! ## Example
//!
//! ```ignore
//! use unflow_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Feed an input; synchronous follow-ups are fully drained on return
//! store.send(Input::Tapped);
//!
//! // Wait for background work to settle, then read state
//! store.wait_for_idle().await;
//! let value = store.state(|s| s.some_field);
//! ```

/// Configuration for Store instances
pub mod config;

/// Store runtime for coordinating reducer execution and effect handling
pub mod store;

mod registry;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    ///
    /// Operation failures are not store errors: they are routed to the
    /// reducer's `handle_error` hook and become ordinary actions.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed. They
        /// have been aborted.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timed out waiting for an action or for the store to go idle
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use store::{Store, StoreBuilder, OPERATION_PANICKED_DOMAIN};
