#[cfg_attr(docsrs, doc(cfg(feature = "transport-audit")))]
#[cfg(feature = "transport-audit")]
#[doc(hidden)]
pub mod audit;

#[cfg(feature = "transport-audit")]
pub use audit::{Audit, AuditEvent, AuditOption};
