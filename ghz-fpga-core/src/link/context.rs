use derive_more::Display;

/// A handle of a context opened on the transport.
///
/// Each board has its own context, and each board group has one more context into which
/// run triggers are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("ctx#{_0}")]
pub struct ContextId(u64);

impl ContextId {
    /// Creates a new [`ContextId`].
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}
