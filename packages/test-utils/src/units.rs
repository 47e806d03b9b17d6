//! Scripted work units
//!
//! Every unit resolves to `Result<T, String>`, which is what the registry
//! expects from a fallible future.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;

/// Unit that sleeps for `delay` and then succeeds with `value`
pub fn delayed_ok<T>(delay: Duration, value: T) -> impl Future<Output = Result<T, String>>
where
    T: Send + 'static,
{
    async move {
        tokio::time::sleep(delay).await;
        Ok(value)
    }
}

/// Unit that sleeps for `delay` and then fails with `message`
pub fn delayed_err<T>(
    delay: Duration,
    message: impl Into<String>,
) -> impl Future<Output = Result<T, String>>
where
    T: Send + 'static,
{
    let message = message.into();
    async move {
        tokio::time::sleep(delay).await;
        Err(message)
    }
}

/// Fires a unit created by [`manual_unit`]
#[derive(Debug)]
pub struct UnitTrigger {
    sender: oneshot::Sender<Result<(), String>>,
}

impl UnitTrigger {
    /// Let the unit succeed
    pub fn succeed(self) {
        let _ = self.sender.send(Ok(()));
    }

    /// Let the unit fail with `message`
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.sender.send(Err(message.into()));
    }
}

/// Unit that stays pending until its trigger fires
///
/// Dropping the trigger without firing it makes the unit fail.
pub fn manual_unit() -> (UnitTrigger, impl Future<Output = Result<(), String>>) {
    let (sender, receiver) = oneshot::channel();
    let unit = async move {
        receiver
            .await
            .unwrap_or_else(|_| Err("trigger dropped".to_string()))
    };
    (UnitTrigger { sender }, unit)
}
