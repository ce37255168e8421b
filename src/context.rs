//! Per-invocation execution scopes and their cancellation.
//!
//! Every RPC runs with its own [`Context`], derived from the inbound one and
//! registered with the server's [`CancellationRegistry`]. StopProvider
//! cancels everything currently registered. Cancellation is cooperative:
//! callbacks observe it through [`Context::is_cancelled`] or
//! [`Context::cancelled`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, trace};

/// Execution scope handed to provider callbacks.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// A fresh root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope cancelled whenever this one is.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Whether the scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled.
    ///
    /// ```
    /// use hemmer_provider_framework::context::Context;
    ///
    /// # tokio_test::block_on(async {
    /// let ctx = Context::new();
    /// let child = ctx.child();
    /// ctx.cancel();
    /// child.cancelled().await;
    /// assert!(child.is_cancelled());
    /// # });
    /// ```
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// The cancellable scopes of in-flight invocations.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    next_id: AtomicU64,
    scopes: Mutex<HashMap<u64, CancellationToken>>,
}

impl CancellationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn scopes(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Derive a scope from `inbound` and track it until the returned
    /// registration is dropped.
    pub fn register(&self, inbound: &Context) -> Registration<'_> {
        let context = inbound.child();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.scopes().insert(id, context.token.clone());
        trace!(scope = id, "registered invocation scope");
        Registration {
            registry: self,
            id,
            context,
        }
    }

    /// Cancel every registered scope and forget them.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<CancellationToken> =
            self.scopes().drain().map(|(_, token)| token).collect();
        for token in &drained {
            token.cancel();
        }
        debug!(count = drained.len(), "cancelled in-flight invocation scopes");
        drained.len()
    }

    /// Number of scopes currently registered.
    pub fn len(&self) -> usize {
        self.scopes().len()
    }

    /// Whether no scope is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered scope. Dropping it deregisters the scope.
#[derive(Debug)]
pub struct Registration<'r> {
    registry: &'r CancellationRegistry,
    id: u64,
    context: Context,
}

impl Registration<'_> {
    /// The registered scope.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.scopes().remove(&self.id);
    }
}
