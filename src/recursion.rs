//! Recursion harness: a single `spawn`/`fetch` primitive used by every
//! binary recursive traversal (compression, mat-vec, solve).
//!
//! Kept as its own scheduling primitive rather than hand-inlined
//! `rayon::scope`/`join` calls at each call site. Uses `rayon::Scope::spawn`,
//! not the global `rayon::spawn`, because the recursive algorithms borrow
//! the input matrix/tree by reference and cannot satisfy the `'static`
//! bound the global pool requires.

use std::sync::mpsc;

/// Shared depth/fan-out state for one top-level recursive call. `spawn`
/// hands out a [`Handle::Parallel`] while `depth < max_split_depth`, and a
/// [`Handle::Deferred`] (synchronous, evaluated at `fetch`) once the tree
/// has fanned out enough tasks to keep the pool busy.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    max_split_depth: usize,
    depth: usize,
}

impl Context {
    /// `max_split_depth = ceil(log2(num_threads)) + 1`.
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let max_split_depth = (usize::BITS - (num_threads - 1).leading_zeros()) as usize + 1;
        Self {
            max_split_depth: if num_threads == 1 { 0 } else { max_split_depth },
            depth: 0,
        }
    }

    /// The context a recursive call should pass to its own children.
    pub fn descend(self) -> Self {
        Self {
            max_split_depth: self.max_split_depth,
            depth: self.depth + 1,
        }
    }

    fn should_split(self) -> bool {
        self.depth < self.max_split_depth
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(rayon::current_num_threads())
    }
}

/// A handle to a unit of work spawned through [`spawn`].
pub enum Handle<'scope, T> {
    Parallel(mpsc::Receiver<T>),
    Deferred(Box<dyn FnOnce() -> T + 'scope>),
}

/// Schedules `f` on `scope` if `context` allows further fan-out, otherwise
/// defers it to run synchronously inside [`fetch`].
pub fn spawn<'scope, T, F>(scope: &rayon::Scope<'scope>, context: Context, f: F) -> Handle<'scope, T>
where
    T: Send + 'scope,
    F: FnOnce() -> T + Send + 'scope,
{
    if context.should_split() {
        let (tx, rx) = mpsc::channel();
        scope.spawn(move |_| {
            // Ignore send errors: a dropped receiver means the caller gave
            // up on this handle, which never happens on the fork-join
            // paths this harness is used for.
            let _ = tx.send(f());
        });
        Handle::Parallel(rx)
    } else {
        Handle::Deferred(Box::new(f))
    }
}

/// Blocks until the handle's work has completed and returns its result.
pub fn fetch<T>(handle: Handle<'_, T>) -> T {
    match handle {
        Handle::Parallel(rx) => rx.recv().expect("spawned task dropped its sender"),
        Handle::Deferred(f) => f(),
    }
}

/// Blocks until the handle's work has completed, discarding the result.
pub fn wait<T>(handle: Handle<'_, T>) {
    let _ = fetch(handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_split_depth_follows_spec_formula() {
        assert_eq!(Context::new(1).max_split_depth, 0);
        assert_eq!(Context::new(2).max_split_depth, 2);
        assert_eq!(Context::new(4).max_split_depth, 3);
        assert_eq!(Context::new(8).max_split_depth, 4);
    }

    #[test]
    fn spawn_and_fetch_roundtrip_in_parallel_and_deferred_regimes() {
        rayon::scope(|scope| {
            let ctx = Context::new(4);
            let h = spawn(scope, ctx, || 2 + 2);
            assert_eq!(fetch(h), 4);

            let deep_ctx = Context {
                max_split_depth: ctx.max_split_depth,
                depth: ctx.max_split_depth,
            };
            let h = spawn(scope, deep_ctx, || 6 * 7);
            assert!(matches!(h, Handle::Deferred(_)));
            assert_eq!(fetch(h), 42);
        });
    }

    #[test]
    fn descend_increments_depth_only() {
        let ctx = Context::new(8).descend().descend();
        assert_eq!(ctx.depth, 2);
        assert_eq!(ctx.max_split_depth, Context::new(8).max_split_depth);
    }
}
