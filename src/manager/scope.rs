/*!
 * Scoped Context Stack
 * Thread-local "current context" stack with RAII release
 */

use crate::capability::context::CapabilityContext;
use crate::core::types::ContextId;
use crate::manager::manager::CapabilityManager;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<CapabilityContext>>> = const { RefCell::new(Vec::new()) };
}

/// The context at the top of this thread's stack, if any
pub(crate) fn current_context() -> Option<Arc<CapabilityContext>> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
}

pub(crate) fn push_context(context: Arc<CapabilityContext>) {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(context));
}

/// Remove a context from the stack by id
///
/// Guards normally drop in LIFO order so this pops the top, but out-of-order
/// drops just remove the matching entry wherever it sits.
pub(crate) fn remove_context(context_id: ContextId) {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack
            .iter()
            .rposition(|ctx| ctx.context_id() == context_id)
        {
            stack.remove(pos);
        }
    });
}

#[cfg(test)]
pub(crate) fn stack_depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

/// RAII handle for a scoped context activation
///
/// While the guard lives, its context is this thread's current context (the
/// previous one is shadowed, not lost). Dropping the guard restores the
/// previous context unconditionally, including on panic and early-return
/// paths, and tells the manager to tear down its registry entry.
///
/// The guard is bound to the thread that activated it: the stack it must
/// restore is thread-local, so the type is `!Send`. Dropping it on another
/// thread would leave the context active on this one.
///
/// ```compile_fail
/// fn requires_send<T: Send>(_: T) {}
///
/// let manager = sandbox_core::CapabilityManager::new();
/// let guard = manager.capability_context("scope", vec![], None);
/// requires_send(guard);
/// ```
#[must_use = "dropping the guard immediately deactivates the context"]
pub struct ContextGuard {
    context: Arc<CapabilityContext>,
    manager: CapabilityManager,
    // Pins the guard to its thread-local stack
    _thread_bound: PhantomData<*const ()>,
}

impl ContextGuard {
    pub(crate) fn new(context: Arc<CapabilityContext>, manager: CapabilityManager) -> Self {
        push_context(Arc::clone(&context));
        Self {
            context,
            manager,
            _thread_bound: PhantomData,
        }
    }

    pub fn context(&self) -> &Arc<CapabilityContext> {
        &self.context
    }

    pub fn context_id(&self) -> ContextId {
        self.context.context_id()
    }
}

impl std::ops::Deref for ContextGuard {
    type Target = CapabilityContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        remove_context(self.context.context_id());
        self.manager.on_context_released(self.context.context_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_push_and_remove() {
        let a = CapabilityContext::new("a", None);
        let b = CapabilityContext::new("b", None);
        let a_id = a.context_id();
        let b_id = b.context_id();

        push_context(a);
        push_context(b);
        assert_eq!(current_context().unwrap().context_id(), b_id);

        remove_context(b_id);
        assert_eq!(current_context().unwrap().context_id(), a_id);

        remove_context(a_id);
        assert!(current_context().is_none());
    }

    #[test]
    fn test_out_of_order_removal() {
        let a = CapabilityContext::new("a", None);
        let b = CapabilityContext::new("b", None);
        let a_id = a.context_id();
        let b_id = b.context_id();

        push_context(a);
        push_context(b);

        // Removing the shadowed entry keeps the top intact
        remove_context(a_id);
        assert_eq!(current_context().unwrap().context_id(), b_id);
        remove_context(b_id);
        assert_eq!(stack_depth(), 0);
    }
}
