use std::str::FromStr;

use derive_more::Display;

use super::{JumpEntry, Operation};
use crate::{error::FpgaDriverError, firmware::build::JumpTableBuild};

/// Name of a jump table command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JumpCommandKind {
    /// `IDLE from_ns duration_ns`
    #[display("IDLE")]
    Idle,
    /// `JUMP from_ns to_ns index`
    #[display("JUMP")]
    Jump,
    /// `CYCLE from_ns to_ns index counter`
    #[display("CYCLE")]
    Cycle,
    /// `NOP from_ns`
    #[display("NOP")]
    Nop,
    /// `END from_ns`
    #[display("END")]
    End,
}

impl FromStr for JumpCommandKind {
    type Err = FpgaDriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(Self::Idle),
            "JUMP" => Ok(Self::Jump),
            "CYCLE" => Ok(Self::Cycle),
            "NOP" => Ok(Self::Nop),
            "END" => Ok(Self::End),
            "CHECK" | "RAMP" => Err(FpgaDriverError::UnsupportedJumpCommand(s.to_owned())),
            _ => Err(FpgaDriverError::UnknownJumpCommand(s.to_owned())),
        }
    }
}

impl JumpCommandKind {
    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Jump => "JUMP",
            Self::Cycle => "CYCLE",
            Self::Nop => "NOP",
            Self::End => "END",
        }
    }

    const fn num_args(&self) -> usize {
        match self {
            Self::Idle => 2,
            Self::Jump => 3,
            Self::Cycle => 4,
            Self::Nop | Self::End => 1,
        }
    }
}

/// A jump table command with addresses in ns, as given by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JumpCommand {
    kind: JumpCommandKind,
    args: Vec<u32>,
}

impl JumpCommand {
    /// Parses `name` and checks the number of arguments.
    pub fn parse(name: &str, args: &[u32]) -> Result<Self, FpgaDriverError> {
        let kind: JumpCommandKind = name.parse()?;
        if args.len() != kind.num_args() {
            return Err(FpgaDriverError::InvalidJumpArguments {
                name: kind.name(),
                expected: kind.num_args(),
                actual: args.len(),
            });
        }
        Ok(Self {
            kind,
            args: args.to_vec(),
        })
    }

    /// The command name.
    #[must_use]
    pub const fn kind(&self) -> JumpCommandKind {
        self.kind
    }

    /// The arguments in ns (indices and counters unitless).
    #[must_use]
    pub fn args(&self) -> &[u32] {
        &self.args
    }

    /// Converts to a jump table entry, applying the offsets of `build`.
    pub fn to_entry(&self, build: &JumpTableBuild) -> Result<JumpEntry, FpgaDriverError> {
        let a = &self.args;
        match self.kind {
            JumpCommandKind::Idle => JumpEntry::new(
                convert_from_address(build, a[0])?,
                0,
                Operation::Idle {
                    cycles: convert_idle_duration(build, a[1])?,
                },
            ),
            JumpCommandKind::Jump => JumpEntry::new(
                convert_from_address(build, a[0])?,
                convert_to_address(build, a[1])?,
                Operation::Jump {
                    index: convert_index(build, a[2])?,
                },
            ),
            JumpCommandKind::Cycle => {
                if a[3] as usize >= build.num_counters {
                    return Err(FpgaDriverError::CounterIndexOutOfRange(
                        a[3],
                        build.num_counters,
                    ));
                }
                JumpEntry::new(
                    convert_from_address(build, a[0])?,
                    convert_to_address(build, a[1])?,
                    Operation::Cycle {
                        counter: a[3],
                        index: convert_index(build, a[2])?,
                    },
                )
            }
            JumpCommandKind::Nop => {
                JumpEntry::new(convert_from_address(build, a[0])?, 0, Operation::Nop)
            }
            JumpCommandKind::End => {
                JumpEntry::new(convert_end_address(build, a[0])?, 0, Operation::End)
            }
        }
    }
}

fn convert(
    kind: &'static str,
    ns: u32,
    offset: i64,
    min: i64,
    max: i64,
) -> Result<u32, FpgaDriverError> {
    if ns % 4 != 0 {
        return Err(FpgaDriverError::JumpAddressNotAligned(ns, kind));
    }
    let cycles = (ns / 4) as i64;
    if !(min..=max).contains(&cycles) {
        return Err(FpgaDriverError::JumpAddressOutOfRange {
            kind,
            value: ns,
            min: (min * 4) as u32,
            max: (max * 4) as u32,
        });
    }
    Ok((cycles + offset) as u32)
}

fn sram_cells(build: &JumpTableBuild) -> i64 {
    (build.sram_len / 4) as i64
}

/// Converts a from address in ns to SRAM cells.
pub fn convert_from_address(build: &JumpTableBuild, ns: u32) -> Result<u32, FpgaDriverError> {
    convert(
        "from address",
        ns,
        build.from_offset,
        build.min_from_spacing as i64 - build.from_offset,
        sram_cells(build) + build.from_offset,
    )
}

/// Converts the from address of an END command in ns to SRAM cells.
pub fn convert_end_address(build: &JumpTableBuild, ns: u32) -> Result<u32, FpgaDriverError> {
    convert(
        "end address",
        ns,
        build.end_offset,
        build.min_from_spacing as i64 - build.end_offset,
        sram_cells(build) + build.end_offset,
    )
}

/// Converts a to address in ns to SRAM cells.
pub fn convert_to_address(build: &JumpTableBuild, ns: u32) -> Result<u32, FpgaDriverError> {
    convert("to address", ns, 0, 0, sram_cells(build))
}

/// Converts an IDLE duration in ns to clock cycles.
pub fn convert_idle_duration(build: &JumpTableBuild, ns: u32) -> Result<u32, FpgaDriverError> {
    convert(
        "idle duration",
        ns,
        build.idle_offset,
        -build.idle_offset,
        (1i64 << build.idle_bits) - 1 - build.idle_offset,
    )
}

/// Shifts a user jump index past the leading NOP.
pub fn convert_index(build: &JumpTableBuild, index: u32) -> Result<u32, FpgaDriverError> {
    index
        .checked_add(build.idx_offset)
        .filter(|&i| i <= super::MAX_JUMP_INDEX)
        .ok_or(FpgaDriverError::JumpIndexOutOfRange(
            index,
            super::MAX_JUMP_INDEX - build.idx_offset,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::build::{Build, BuildParams};
    use ghz_fpga_core::board::BoardType;

    fn build() -> JumpTableBuild {
        match Build::find(BoardType::Dac, 15).map(|b| *b.params()) {
            Ok(BuildParams::DacJumpTable(p)) => p,
            _ => panic!("build 15 is a jump table build"),
        }
    }

    #[rstest::rstest]
    #[test]
    #[case(Ok(2), 16)]
    #[case(Ok(4604), 4606 * 4)]
    #[case(Err(FpgaDriverError::JumpAddressOutOfRange { kind: "from address", value: 12, min: 16, max: 18424 }), 12)]
    #[case(Err(FpgaDriverError::JumpAddressOutOfRange { kind: "from address", value: 18428, min: 16, max: 18424 }), 4607 * 4)]
    #[case(Err(FpgaDriverError::JumpAddressNotAligned(18, "from address")), 18)]
    fn from_address(#[case] expect: Result<u32, FpgaDriverError>, #[case] ns: u32) {
        assert_eq!(expect, convert_from_address(&build(), ns));
    }

    #[rstest::rstest]
    #[test]
    #[case(Ok(61), 256)]
    #[case(Ok(2), 20)]
    #[case(Ok(4602), 4605 * 4)]
    #[case(Err(FpgaDriverError::JumpAddressOutOfRange { kind: "end address", value: 16, min: 20, max: 18420 }), 16)]
    #[case(Err(FpgaDriverError::JumpAddressOutOfRange { kind: "end address", value: 18424, min: 20, max: 18420 }), 4606 * 4)]
    fn end_address(#[case] expect: Result<u32, FpgaDriverError>, #[case] ns: u32) {
        assert_eq!(expect, convert_end_address(&build(), ns));
    }

    #[rstest::rstest]
    #[test]
    #[case(Ok(0), 0)]
    #[case(Ok(4608), 18432)]
    #[case(Err(FpgaDriverError::JumpAddressOutOfRange { kind: "to address", value: 18436, min: 0, max: 18432 }), 18436)]
    fn to_address(#[case] expect: Result<u32, FpgaDriverError>, #[case] ns: u32) {
        assert_eq!(expect, convert_to_address(&build(), ns));
    }

    #[rstest::rstest]
    #[test]
    #[case(Ok(0), 0)]
    #[case(Ok(32767), 32767 * 4)]
    #[case(Err(FpgaDriverError::JumpAddressOutOfRange { kind: "idle duration", value: 32768 * 4, min: 0, max: 32767 * 4 }), 32768 * 4)]
    fn idle_duration(#[case] expect: Result<u32, FpgaDriverError>, #[case] ns: u32) {
        assert_eq!(expect, convert_idle_duration(&build(), ns));
    }

    #[rstest::rstest]
    #[test]
    #[case(Ok(1), 0)]
    #[case(Ok(63), 62)]
    #[case(Err(FpgaDriverError::JumpIndexOutOfRange(63, 62)), 63)]
    fn index(#[case] expect: Result<u32, FpgaDriverError>, #[case] idx: u32) {
        assert_eq!(expect, convert_index(&build(), idx));
    }

    #[test]
    fn parse() -> anyhow::Result<()> {
        let end = JumpCommand::parse("END", &[256])?.to_entry(&build())?;
        assert_eq!(JumpEntry::new(256 / 4 - 3, 0, Operation::End)?, end);

        let cycle = JumpCommand::parse("CYCLE", &[400, 100, 0, 2])?.to_entry(&build())?;
        assert_eq!(
            JumpEntry::new(98, 25, Operation::Cycle { counter: 2, index: 1 })?,
            cycle
        );

        let idle = JumpCommand::parse("IDLE", &[40, 400])?.to_entry(&build())?;
        assert_eq!(JumpEntry::new(8, 0, Operation::Idle { cycles: 100 })?, idle);

        assert_eq!(
            Err(FpgaDriverError::UnknownJumpCommand("FOO".to_owned())),
            JumpCommand::parse("FOO", &[])
        );
        assert_eq!(
            Err(FpgaDriverError::UnsupportedJumpCommand("CHECK".to_owned())),
            JumpCommand::parse("CHECK", &[1, 2, 3])
        );
        assert_eq!(
            Err(FpgaDriverError::InvalidJumpArguments {
                name: "JUMP",
                expected: 3,
                actual: 2
            }),
            JumpCommand::parse("JUMP", &[1, 2])
        );
        assert_eq!(
            Err(FpgaDriverError::CounterIndexOutOfRange(4, 4)),
            JumpCommand::parse("CYCLE", &[400, 100, 0, 4])?.to_entry(&build())
        );
        Ok(())
    }
}
