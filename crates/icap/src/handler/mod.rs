//! The seam between the connection loop and the application.
//!
//! A [`Handler`] sees each request at most twice: once with the preview, when the
//! client sent one, and again with the full body after it answered
//! [`Outcome::Continue`].

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;

use crate::protocol::{IcapRequest, IcapResponse};

/// What a handler decided about a request.
#[derive(Debug)]
pub enum Outcome {
    Respond(IcapResponse),
    /// Ask for the rest of a previewed body. Only valid while the request is incomplete.
    Continue,
}

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, req: &IcapRequest) -> Result<Outcome, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<Err, F, Fut> Handler for HandlerFn<F>
where
    F: Fn(&IcapRequest) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Fut: Future<Output = Result<Outcome, Err>> + Send,
{
    type Error = Err;

    async fn call(&self, req: &IcapRequest) -> Result<Outcome, Self::Error> {
        (self.f)(req).await
    }
}

/// Wraps a closure as a [`Handler`]. The returned future may not borrow the request.
pub fn make_handler<F, Err, Ret>(f: F) -> HandlerFn<F>
where
    Err: Into<Box<dyn Error + Send + Sync>>,
    Ret: Future<Output = Result<Outcome, Err>>,
    F: Fn(&IcapRequest) -> Ret,
{
    HandlerFn { f }
}
