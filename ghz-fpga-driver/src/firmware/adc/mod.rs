mod mixer;
mod trigger;

pub use mixer::MixerTable;
pub use trigger::{TriggerRow, TriggerTable};

use std::collections::BTreeMap;

use derive_new::new;

use super::build::AdcBuild;
use crate::error::FpgaDriverError;

/// Tables that must be written to an ADC before a demodulator run.
#[derive(Clone, Debug, PartialEq, Eq, new)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdcSetup {
    triggers: TriggerTable,
    mixers: BTreeMap<usize, MixerTable>,
}

impl AdcSetup {
    /// The trigger table.
    #[must_use]
    pub const fn triggers(&self) -> &TriggerTable {
        &self.triggers
    }

    /// The mixer tables by channel.
    #[must_use]
    pub const fn mixers(&self) -> &BTreeMap<usize, MixerTable> {
        &self.mixers
    }

    /// Trigger packet followed by the mixer packets in channel order.
    pub fn packets(&self, build: &AdcBuild) -> Result<Vec<Vec<u8>>, FpgaDriverError> {
        std::iter::once(Ok(self.triggers.packet(build)))
            .chain(self.mixers.iter().map(|(&ch, m)| m.packet(build, ch)))
            .collect()
    }

    /// Canonical description of the setup.
    ///
    /// Equal setups always produce equal descriptors.
    #[must_use]
    pub fn descriptor(&self) -> String {
        std::iter::once(self.triggers.descriptor())
            .chain(
                self.mixers
                    .iter()
                    .map(|(ch, m)| format!("mixTable{}={}", ch, m)),
            )
            .collect::<Vec<_>>()
            .join(" ")
    }
}
