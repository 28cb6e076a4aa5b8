//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when building `Run` and `SleepThen`
//! effects inside a reducer.

/// Create an `Effect::Run` from an async block
///
/// The block evaluates to `Option<Action>`. Prefix it with `id: expr;` to
/// occupy a cancellation slot.
///
/// # Example
///
/// ```rust,ignore
/// use unflow_core::async_effect;
///
/// async_effect! {
///     let fact = env.facts.fetch(count).await;
///     Some(CounterAction::FactLoaded(fact))
/// }
///
/// async_effect! { id: CounterTask::Fact;
///     let fact = env.facts.fetch(count).await;
///     Some(CounterAction::FactLoaded(fact))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    (id: $id:expr; $($body:tt)*) => {
        $crate::effect::Effect::Run {
            id: ::std::option::Option::Some($id),
            operation: $crate::operation::Operation::from_optional(async move { $($body)* }),
        }
    };
    ($($body:tt)*) => {
        $crate::effect::Effect::Run {
            id: ::std::option::Option::None,
            operation: $crate::operation::Operation::from_optional(async move { $($body)* }),
        }
    };
}

/// Create an `Effect::SleepThen` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use unflow_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: SessionAction::Expired
/// }
///
/// delay! {
///     id: SessionTask::Expiry,
///     duration: Duration::from_secs(30),
///     action: SessionAction::Expired
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        id: $id:expr,
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::SleepThen {
            id: ::std::option::Option::Some($id),
            duration: $duration,
            action: $action,
        }
    };
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::SleepThen {
            id: ::std::option::Option::None,
            duration: $duration,
            action: $action,
        }
    };
}
