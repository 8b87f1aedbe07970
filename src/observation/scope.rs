//! "Current observation" tracking.
//!
//! Each thread keeps a stack of running observations. Entering a scope
//! pushes, dropping the guard pops, so nesting restores the outer
//! observation automatically. Async work re-enters its scope on every poll
//! (see `ObservedFuture`), which makes the slot follow the task rather than
//! the worker thread.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::observation::context::{ObservationHandle, ObservationId};

thread_local! {
    static CURRENT: RefCell<Vec<ObservationHandle>> = const { RefCell::new(Vec::new()) };
}

/// Innermost observation in scope on this thread.
pub(crate) fn current() -> Option<ObservationHandle> {
    CURRENT.with(|stack| stack.borrow().last().cloned())
}

/// Make `handle` current until the returned guard drops.
pub(crate) fn enter(handle: ObservationHandle) -> CurrentGuard {
    let id = handle.id();
    CURRENT.with(|stack| stack.borrow_mut().push(handle));
    CurrentGuard {
        id,
        _not_send: PhantomData,
    }
}

/// Pops its observation on drop. Bound to the thread that created it.
pub(crate) struct CurrentGuard {
    id: ObservationId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last() {
                Some(top) if top.id() == self.id => {
                    stack.pop();
                }
                _ => {
                    // Guards dropped out of order; remove ours wherever it sits.
                    if let Some(pos) = stack.iter().rposition(|h| h.id() == self.id) {
                        stack.remove(pos);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::context::ObservationContext;
    use crate::observation::trace::TraceIdentity;

    fn handle(name: &str) -> ObservationHandle {
        let ctx = ObservationContext::new(name.into());
        ObservationHandle::new(&ctx, TraceIdentity::default().start("test.op", None))
    }

    #[test]
    fn test_nested_guards_restore_outer() {
        assert!(current().is_none());
        let outer = handle("outer");
        let outer_guard = enter(outer.clone());
        {
            let _inner_guard = enter(handle("inner"));
            assert_eq!(current().unwrap().technical_name(), "inner");
        }
        assert_eq!(current().unwrap().id(), outer.id());
        drop(outer_guard);
        assert!(current().is_none());
    }

    #[test]
    fn test_out_of_order_drop_keeps_stack_consistent() {
        let a = enter(handle("a"));
        let b = enter(handle("b"));
        drop(a);
        assert_eq!(current().unwrap().technical_name(), "b");
        drop(b);
        assert!(current().is_none());
    }

    #[test]
    fn test_threads_have_independent_slots() {
        let _guard = enter(handle("main"));
        let seen = std::thread::spawn(|| current().map(|h| h.technical_name().to_string()))
            .join()
            .unwrap();
        assert!(seen.is_none());
    }
}
