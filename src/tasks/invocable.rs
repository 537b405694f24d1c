//! # Task Binding and Invocation
//!
//! A registered task is a [`TaskHandler`]: an object that validates a
//! signature's typed arguments and produces a ready-to-run [`BoundTask`].
//! Binding failures mean the signature is malformed and are never retried;
//! call failures are runtime errors and consume the retry budget.
//!
//! The [`task_fn`] adapter lets user code register plain typed async
//! functions; the argument decoding a dynamic language would do with
//! reflection happens here, once, through [`FromTaskArg`].

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;

use super::args::{TaskArg, TaskResult};

/// Argument binding failure: the signature does not fit the registered task.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("task takes {expected} arguments, signature carries {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index} has type tag '{actual}', expected '{expected}'")]
    TypeTag {
        index: usize,
        expected: &'static str,
        actual: String,
    },

    #[error("argument {index} does not decode as '{expected}': {reason}")]
    Value {
        index: usize,
        expected: &'static str,
        reason: String,
    },
}

/// Runtime failure raised by the task callable itself.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct CallError {
    pub message: String,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for CallError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CallError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// What a task call produces: ordered typed results, or a runtime error.
pub type CallResult = Result<Vec<TaskResult>, CallError>;

/// A task whose arguments have been validated and captured, ready to run.
pub struct BoundTask {
    future: BoxFuture<'static, CallResult>,
}

impl BoundTask {
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = CallResult> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Run the callable. User code may block or do arbitrary I/O here.
    pub async fn call(self) -> CallResult {
        self.future.await
    }
}

impl fmt::Debug for BoundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundTask").finish_non_exhaustive()
    }
}

/// A registered task callable.
pub trait TaskHandler: Send + Sync {
    /// Validate `args` against the callable's parameters and produce a ready
    /// invocation. Binding is eager: every argument is decoded before the
    /// task is considered started.
    fn bind(&self, args: &[TaskArg]) -> Result<BoundTask, BindError>;
}

/// Decode one typed argument into a concrete parameter type.
///
/// The declared type tag is checked before the value is deserialized, so a
/// wrong tag fails binding even when the JSON value would coerce.
pub trait FromTaskArg: DeserializeOwned + Send + 'static {
    const TYPE_TAG: &'static str;

    fn from_arg(index: usize, arg: &TaskArg) -> Result<Self, BindError> {
        if arg.type_tag != Self::TYPE_TAG {
            return Err(BindError::TypeTag {
                index,
                expected: Self::TYPE_TAG,
                actual: arg.type_tag.clone(),
            });
        }
        serde_json::from_value(arg.value.clone()).map_err(|err| BindError::Value {
            index,
            expected: Self::TYPE_TAG,
            reason: err.to_string(),
        })
    }
}

impl FromTaskArg for i64 {
    const TYPE_TAG: &'static str = "int";
}

impl FromTaskArg for f64 {
    const TYPE_TAG: &'static str = "float";
}

impl FromTaskArg for bool {
    const TYPE_TAG: &'static str = "bool";
}

impl FromTaskArg for String {
    const TYPE_TAG: &'static str = "string";
}

/// Adapter turning a typed async function into a [`TaskHandler`].
///
/// `Args` is the tuple of parameter types; it is inferred at the
/// [`task_fn`] call site from the function's signature.
pub struct TaskFn<F, Args> {
    f: F,
    _marker: PhantomData<fn() -> Args>,
}

/// Wrap a typed async function for registration:
///
/// ```
/// use std::sync::Arc;
/// use taskweave::tasks::{task_fn, TaskHandler, TaskResult};
///
/// let add: Arc<dyn TaskHandler> =
///     Arc::new(task_fn(|a: i64, b: i64| async move { Ok(vec![TaskResult::int(a + b)]) }));
/// ```
pub fn task_fn<F, Args>(f: F) -> TaskFn<F, Args>
where
    TaskFn<F, Args>: TaskHandler,
{
    TaskFn {
        f,
        _marker: PhantomData,
    }
}

macro_rules! impl_task_fn {
    ($arity:literal $(, $idx:tt => $ty:ident)*) => {
        impl<F, Fut $(, $ty)*> TaskHandler for TaskFn<F, ($($ty,)*)>
        where
            F: Fn($($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = CallResult> + Send + 'static,
            $($ty: FromTaskArg,)*
        {
            #[allow(non_snake_case)]
            fn bind(&self, args: &[TaskArg]) -> Result<BoundTask, BindError> {
                if args.len() != $arity {
                    return Err(BindError::Arity {
                        expected: $arity,
                        actual: args.len(),
                    });
                }
                $(let $ty = <$ty as FromTaskArg>::from_arg($idx, &args[$idx])?;)*
                let f = self.f.clone();
                Ok(BoundTask::from_future(async move { f($($ty),*).await }))
            }
        }
    };
}

impl_task_fn!(0);
impl_task_fn!(1, 0 => A0);
impl_task_fn!(2, 0 => A0, 1 => A1);
impl_task_fn!(3, 0 => A0, 1 => A1, 2 => A2);
impl_task_fn!(4, 0 => A0, 1 => A1, 2 => A2, 3 => A3);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_call() {
        let handler = task_fn(|a: i64, b: i64| async move { Ok(vec![TaskResult::int(a + b)]) });

        let bound = handler
            .bind(&[TaskArg::int(2), TaskArg::int(3)])
            .expect("binding valid args");
        let results = bound.call().await.expect("call succeeds");
        assert_eq!(results, vec![TaskResult::int(5)]);
    }

    #[tokio::test]
    async fn test_zero_arity() {
        let handler = task_fn(|| async { Ok(vec![TaskResult::string("pong")]) });

        let bound = handler.bind(&[]).expect("binding no args");
        assert_eq!(
            bound.call().await.unwrap(),
            vec![TaskResult::string("pong")]
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let handler = task_fn(|a: i64, b: i64| async move { Ok(vec![TaskResult::int(a + b)]) });

        let err = handler.bind(&[TaskArg::int(2)]).unwrap_err();
        assert!(matches!(
            err,
            BindError::Arity {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_type_tag_mismatch() {
        let handler = task_fn(|a: i64, b: i64| async move { Ok(vec![TaskResult::int(a + b)]) });

        let err = handler
            .bind(&[TaskArg::string("oops"), TaskArg::int(3)])
            .unwrap_err();
        assert!(matches!(
            err,
            BindError::TypeTag {
                index: 0,
                expected: "int",
                ..
            }
        ));
    }

    #[test]
    fn test_value_does_not_decode() {
        let handler = task_fn(|a: i64| async move { Ok(vec![TaskResult::int(a)]) });

        let err = handler
            .bind(&[TaskArg::new("int", "not a number")])
            .unwrap_err();
        assert!(matches!(err, BindError::Value { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_call_error_surfaces() {
        let handler = task_fn(|| async { Err(CallError::new("flaky as always")) });

        let bound = handler.bind(&[]).expect("binding succeeds");
        let err = bound.call().await.unwrap_err();
        assert_eq!(err.message, "flaky as always");
    }
}
