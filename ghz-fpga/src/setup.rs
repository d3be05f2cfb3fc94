use std::{fmt, sync::Arc};

use crate::error::FpgaError;

/// Work that must be done outside of the board group before a run starts,
/// e.g. setting the frequency of a microwave source.
///
/// Setup actions are applied after the previous run has finished and before the run
/// packet is sent, together with the setup tables of the ADCs.
#[async_trait::async_trait]
pub trait SetupAction: Send + Sync + fmt::Debug {
    /// Applies the setup.
    async fn apply(&self) -> Result<(), FpgaError>;
}

#[async_trait::async_trait]
impl<S: SetupAction + ?Sized> SetupAction for Arc<S> {
    async fn apply(&self) -> Result<(), FpgaError> {
        self.as_ref().apply().await
    }
}
