/// ADC trigger and mixer tables.
pub mod adc;
/// Static build capability table.
pub mod build;
/// Jump-table codec.
pub mod jump_table;
/// Memory-sequence commands and analysis.
pub mod memory;
/// Register packet codec.
pub mod register;
/// SRAM and memory write packets.
pub mod sram;

use crate::error::FpgaDriverError;

pub(crate) fn check_field(field: &'static str, value: u64, max: u64) -> Result<(), FpgaDriverError> {
    if value > max {
        return Err(FpgaDriverError::RegisterFieldOutOfRange { field, value, max });
    }
    Ok(())
}
