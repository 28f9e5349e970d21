//! Cursor-based interceptor chain.
//!
//! A chain is a slice of interceptors plus one terminal handler. Running it
//! calls interceptor 0 with a [`Next`] pointing at index 1; each interceptor
//! either hands control on with [`Next::proceed`] or stops with
//! [`Next::reject`]. When the cursor runs off the end, the terminal handler
//! runs and its boolean becomes the chain result.
//!
//! An interceptor must return a [`Verdict`], and a `Verdict` can only be
//! obtained from `proceed` or `reject`. An interceptor that silently drops its
//! continuation therefore does not compile.

use std::sync::Arc;

use super::CommandArgs;
use crate::transport::Connection;

/// Identity of the session a command runs for.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    /// Session id ([`SELF_SESSION`](crate::subscription::SELF_SESSION) for in-process calls).
    pub session_id: &'a str,
    /// Transport connection, absent for in-process calls.
    pub connection: Option<&'a Arc<dyn Connection>>,
}

impl<'a> SessionContext<'a> {
    /// Context of an in-process call.
    pub fn local(session_id: &'a str) -> Self {
        Self {
            session_id,
            connection: None,
        }
    }

    /// Check if the command came from a transport connection.
    #[inline]
    pub fn is_remote(&self) -> bool {
        self.connection.is_some()
    }
}

/// Result of an interceptor. Only [`Next`] can produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Verdict(bool);

impl Verdict {
    /// Check if the command went through.
    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.0
    }
}

/// An interceptor: observes or mutates the command arguments, then proceeds or rejects.
pub type Middleware =
    Arc<dyn Fn(&SessionContext<'_>, &mut CommandArgs, Next<'_>) -> Verdict + Send + Sync>;

/// Wrap a closure as a [`Middleware`].
///
/// # Example
///
/// ```
/// use stomp_broker::middleware::{middleware, CommandArgs};
///
/// let deny_anonymous = middleware(|_ctx, args, next| match args {
///     CommandArgs::Connect { headers, .. } if !headers.contains("login") => next.reject(),
///     _ => next.proceed(args),
/// });
/// # let _ = deny_anonymous;
/// ```
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(&SessionContext<'_>, &mut CommandArgs, Next<'_>) -> Verdict + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Continuation handed to each interceptor.
pub struct Next<'a> {
    chain: &'a [Middleware],
    cursor: usize,
    ctx: &'a SessionContext<'a>,
    terminal: &'a mut (dyn FnMut(&mut CommandArgs) -> bool + 'a),
}

impl<'a> Next<'a> {
    /// Continue with the next interceptor, or the terminal handler.
    pub fn proceed(self, args: &mut CommandArgs) -> Verdict {
        match self.chain.get(self.cursor) {
            Some(handler) => {
                let next = Next {
                    chain: self.chain,
                    cursor: self.cursor + 1,
                    ctx: self.ctx,
                    terminal: self.terminal,
                };
                handler(self.ctx, args, next)
            }
            None => Verdict((self.terminal)(args)),
        }
    }

    /// Stop the chain; the terminal handler does not run.
    pub fn reject(self) -> Verdict {
        Verdict(false)
    }

    /// Number of interceptors still ahead of this continuation.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.cursor)
    }
}

/// Run `chain` in registration order, ending in `terminal`.
///
/// Returns the terminal handler's result, or `false` if an interceptor
/// rejected.
pub fn run_chain(
    chain: &[Middleware],
    ctx: &SessionContext<'_>,
    args: &mut CommandArgs,
    terminal: &mut dyn FnMut(&mut CommandArgs) -> bool,
) -> bool {
    let next = Next {
        chain,
        cursor: 0,
        ctx,
        terminal,
    };
    next.proceed(args).is_accepted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn unsubscribe_args() -> CommandArgs {
        CommandArgs::Unsubscribe {
            id: "s1".to_string(),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
        let log = log.clone();
        middleware(move |_ctx, args, next| {
            log.lock().unwrap().push(name.to_string());
            next.proceed(args)
        })
    }

    #[test]
    fn test_empty_chain_runs_terminal() {
        let ctx = SessionContext::local("self");
        let mut args = unsubscribe_args();
        assert!(run_chain(&[], &ctx, &mut args, &mut |_| true));
        assert!(!run_chain(&[], &ctx, &mut args, &mut |_| false));
    }

    #[test]
    fn test_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![recorder(&log, "first"), recorder(&log, "second")];
        let ctx = SessionContext::local("self");
        let mut args = unsubscribe_args();

        let terminal_log = log.clone();
        let accepted = run_chain(&chain, &ctx, &mut args, &mut |_| {
            terminal_log.lock().unwrap().push("terminal".to_string());
            true
        });

        assert!(accepted);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "terminal"]);
    }

    #[test]
    fn test_reject_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recorder(&log, "first"),
            middleware(|_ctx, _args, next| next.reject()),
            recorder(&log, "never"),
        ];
        let ctx = SessionContext::local("self");
        let mut args = unsubscribe_args();

        let mut terminal_ran = false;
        let accepted = run_chain(&chain, &ctx, &mut args, &mut |_| {
            terminal_ran = true;
            true
        });

        assert!(!accepted);
        assert!(!terminal_ran);
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_interceptor_can_mutate_args() {
        let chain = vec![middleware(|_ctx, args, next| {
            if let CommandArgs::Unsubscribe { id } = args {
                id.push_str("-rewritten");
            }
            next.proceed(args)
        })];
        let ctx = SessionContext::local("self");
        let mut args = unsubscribe_args();

        let mut seen = String::new();
        run_chain(&chain, &ctx, &mut args, &mut |args| {
            if let CommandArgs::Unsubscribe { id } = args {
                seen = id.clone();
            }
            true
        });

        assert_eq!(seen, "s1-rewritten");
    }

    #[test]
    fn test_interceptor_sees_session() {
        let chain = vec![middleware(|ctx, args, next| {
            if ctx.session_id == "blocked" {
                next.reject()
            } else {
                next.proceed(args)
            }
        })];
        let mut args = unsubscribe_args();

        assert!(!run_chain(&chain, &SessionContext::local("blocked"), &mut args, &mut |_| true));
        assert!(run_chain(&chain, &SessionContext::local("ok"), &mut args, &mut |_| true));
    }

    #[test]
    fn test_remaining_counts_down() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        let b = seen.clone();
        let chain = vec![
            middleware(move |_ctx, args, next| {
                a.lock().unwrap().push(next.remaining());
                next.proceed(args)
            }),
            middleware(move |_ctx, args, next| {
                b.lock().unwrap().push(next.remaining());
                next.proceed(args)
            }),
        ];
        let mut args = unsubscribe_args();
        run_chain(&chain, &SessionContext::local("self"), &mut args, &mut |_| true);

        assert_eq!(*seen.lock().unwrap(), vec![1, 0]);
    }
}
