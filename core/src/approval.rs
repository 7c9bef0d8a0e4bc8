//! Human-in-the-loop approval of function calls.
//!
//! Functions flagged with [`Function::requiring_approval`] are only executed after the request's
//! [`Approver`] agreed. Declining produces an unsuccessful return value that tells the model the
//! call did not happen, so the conversation can go on.
//!
//! ```rust,ignore
//! use chatloop_core::{ChatRequest, approval_fn};
//!
//! let request = ChatRequest::new(messages)
//!     .with_approver(approval_fn(|invocation, _function| {
//!         let allowed = invocation.name != "delete_everything";
//!         async move { Ok(allowed) }
//!     }));
//! ```

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

use crate::function::Function;
use crate::message::FunctionInvocation;

/// Decides whether a function call may go ahead.
pub trait Approver: Send + Sync + 'static {
    /// Returns `Ok(true)` to run the function, `Ok(false)` to decline it.
    ///
    /// An error is reported to the model as an unsuccessful return value carrying the error
    /// message; it does not stop the execution.
    fn approve(
        &self,
        invocation: &FunctionInvocation,
        function: &Function,
    ) -> impl Future<Output = crate::Result<bool>> + Send;
}

trait DynApprover: Send + Sync {
    fn approve<'a>(
        &'a self,
        invocation: &'a FunctionInvocation,
        function: &'a Function,
    ) -> Pin<Box<dyn Future<Output = crate::Result<bool>> + Send + 'a>>;
}

impl<T: Approver> DynApprover for T {
    fn approve<'a>(
        &'a self,
        invocation: &'a FunctionInvocation,
        function: &'a Function,
    ) -> Pin<Box<dyn Future<Output = crate::Result<bool>> + Send + 'a>> {
        Box::pin(Approver::approve(self, invocation, function))
    }
}

/// A type-erased, cheaply cloneable [`Approver`], as stored in a request.
#[derive(Clone)]
pub struct SharedApprover(Arc<dyn DynApprover>);

impl SharedApprover {
    /// Wraps an approver.
    pub fn new(approver: impl Approver) -> Self {
        Self(Arc::new(approver))
    }

    /// Asks the wrapped approver.
    ///
    /// # Errors
    ///
    /// Returns whatever error the approver reports.
    pub async fn approve(
        &self,
        invocation: &FunctionInvocation,
        function: &Function,
    ) -> crate::Result<bool> {
        self.0.approve(invocation, function).await
    }
}

impl fmt::Debug for SharedApprover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedApprover")
    }
}

impl<T: Approver> From<T> for SharedApprover {
    fn from(approver: T) -> Self {
        Self::new(approver)
    }
}

/// An [`Approver`] backed by a closure. Created by [`approval_fn`].
pub struct FnApprover<F>(F);

impl<F> fmt::Debug for FnApprover<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnApprover")
    }
}

/// Builds an [`Approver`] from a closure.
///
/// The closure receives the invocation and the function descriptor and returns a future that
/// owns whatever it needs from them.
pub const fn approval_fn<F, Fut>(f: F) -> FnApprover<F>
where
    F: Fn(&FunctionInvocation, &Function) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<bool>> + Send + 'static,
{
    FnApprover(f)
}

impl<F, Fut> Approver for FnApprover<F>
where
    F: Fn(&FunctionInvocation, &Function) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<bool>> + Send + 'static,
{
    fn approve(
        &self,
        invocation: &FunctionInvocation,
        function: &Function,
    ) -> impl Future<Output = crate::Result<bool>> + Send {
        (self.0)(invocation, function)
    }
}

/// Approves every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysApprove;

impl Approver for AlwaysApprove {
    async fn approve(&self, _: &FunctionInvocation, _: &Function) -> crate::Result<bool> {
        Ok(true)
    }
}

/// Declines every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDecline;

impl Approver for AlwaysDecline {
    async fn approve(&self, _: &FunctionInvocation, _: &Function) -> crate::Result<bool> {
        Ok(false)
    }
}
