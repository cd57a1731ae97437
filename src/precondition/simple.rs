use tracing::debug;
use tracing::info;

use super::short_type_name;
use super::Precondition;
use super::PreconditionId;
use crate::PreconditionError;
use crate::TestContext;

/// Verifies whether a condition is fulfilled and only manipulates the device
/// if it isn't.
pub trait SimplePrecondition: Send + Sync + 'static {
    /// Returns true if executing manipulations is not required.
    fn is_precondition_met(
        &self,
        ctx: &TestContext,
    ) -> Result<bool, PreconditionError>;

    /// Returns true if the manipulation succeeded.
    fn manipulate(
        &self,
        ctx: &TestContext,
    ) -> Result<bool, PreconditionError>;
}

/// Always executes its manipulation.
pub trait ManipulationPrecondition: Send + Sync + 'static {
    /// Returns true if the manipulation succeeded.
    fn manipulate(
        &self,
        ctx: &TestContext,
    ) -> Result<bool, PreconditionError>;
}

/// Registry entry wrapping a [`SimplePrecondition`], identified by `P`.
pub struct SimpleAdapter<P> {
    inner: P,
}

impl<P: SimplePrecondition> SimpleAdapter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: SimplePrecondition> Precondition for SimpleAdapter<P> {
    fn verify_precondition(
        &self,
        ctx: &TestContext,
    ) -> Result<(), PreconditionError> {
        if self.inner.is_precondition_met(ctx)? {
            debug!("Precondition {} already met", self.name());
            return Ok(());
        }
        report_manipulation(self.name(), self.inner.manipulate(ctx)?);
        Ok(())
    }

    fn id(&self) -> PreconditionId {
        PreconditionId::of::<P>()
    }

    fn name(&self) -> &str {
        short_type_name::<P>()
    }
}

/// Registry entry wrapping a [`ManipulationPrecondition`], identified by `P`.
pub struct ManipulationAdapter<P> {
    inner: P,
}

impl<P: ManipulationPrecondition> ManipulationAdapter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: ManipulationPrecondition> Precondition for ManipulationAdapter<P> {
    fn verify_precondition(
        &self,
        ctx: &TestContext,
    ) -> Result<(), PreconditionError> {
        report_manipulation(self.name(), self.inner.manipulate(ctx)?);
        Ok(())
    }

    fn id(&self) -> PreconditionId {
        PreconditionId::of::<P>()
    }

    fn name(&self) -> &str {
        short_type_name::<P>()
    }
}

/// An unsuccessful manipulation is not a failure of the precondition itself
pub(crate) fn report_manipulation(
    name: &str,
    succeeded: bool,
) {
    if succeeded {
        debug!("Manipulation of precondition {} succeeded", name);
    } else {
        info!("Manipulation of precondition {} reported no success", name);
    }
}
