//! Handler factory port.
//!
//! The pipeline asks the factory for a fresh handler for every dispatch and
//! hands it back afterwards, so a container can scope dependencies to one
//! request. `H` is the handler trait object, e.g. `dyn RequestHandler<R>`.

use crate::domain::BrighterError;

pub trait HandlerFactory<H: ?Sized>: Send + Sync {
    fn create(&self) -> Result<Box<H>, BrighterError>;

    fn release(&self, handler: Box<H>) {
        drop(handler);
    }
}

/// Any `Fn() -> Box<H>` is a factory with no release step.
impl<H: ?Sized, F> HandlerFactory<H> for F
where
    F: Fn() -> Box<H> + Send + Sync,
{
    fn create(&self) -> Result<Box<H>, BrighterError> {
        Ok(self())
    }
}
