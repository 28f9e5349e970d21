//! Interceptor registry keyed by command.
//!
//! # Example
//!
//! ```
//! use stomp_broker::middleware::{middleware, MiddlewareCommand, MiddlewareRegistry};
//!
//! let mut registry = MiddlewareRegistry::new();
//! let log = middleware(|ctx, args, next| {
//!     println!("{} from {}", args.command(), ctx.session_id);
//!     next.proceed(args)
//! });
//!
//! registry.add(MiddlewareCommand::Send, log.clone());
//! assert_eq!(registry.len(MiddlewareCommand::Send), 1);
//! assert!(registry.remove(MiddlewareCommand::Send, &log));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::{Middleware, MiddlewareCommand};

/// Ordered interceptor lists per command.
#[derive(Default)]
pub struct MiddlewareRegistry {
    chains: HashMap<MiddlewareCommand, Vec<Middleware>>,
}

impl MiddlewareRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor to a command's chain.
    pub fn add(&mut self, command: MiddlewareCommand, handler: Middleware) {
        self.chains.entry(command).or_default().push(handler);
    }

    /// Replace a command's chain with a single interceptor.
    pub fn set(&mut self, command: MiddlewareCommand, handler: Middleware) {
        self.chains.insert(command, vec![handler]);
    }

    /// Remove an interceptor by identity.
    ///
    /// Returns `false` if it was not registered for `command`.
    pub fn remove(&mut self, command: MiddlewareCommand, handler: &Middleware) -> bool {
        let Some(chain) = self.chains.get_mut(&command) else {
            return false;
        };
        match chain.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(pos) => {
                chain.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Snapshot of a command's chain, in registration order.
    ///
    /// The snapshot is detached from the registry so it can run without
    /// holding any lock.
    pub fn chain(&self, command: MiddlewareCommand) -> Vec<Middleware> {
        self.chains.get(&command).cloned().unwrap_or_default()
    }

    /// Number of interceptors registered for `command`.
    pub fn len(&self, command: MiddlewareCommand) -> usize {
        self.chains.get(&command).map_or(0, Vec::len)
    }

    /// Drop every chain.
    pub fn clear(&mut self) {
        self.chains.clear();
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for command in MiddlewareCommand::ALL {
            map.entry(&command.as_str(), &self.len(command));
        }
        map.finish()
    }
}
