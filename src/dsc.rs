// SPDX-License-Identifier: GPL-3.0-only
//! DSC read/decide/write/verify state machine
//!
//! Two knobs pick the behaviour for a deployment:
//!
//! - [`DecodePolicy`] turns the raw DPCD[0x160] byte into [`DscState`]
//! - [`WritePolicy`] decides whether to write `1`
//!
//! Conservative and daisy-chain policies are idempotent: a second run on a
//! panel that already reads `On` performs no write. The aggressive policy
//! writes on every invocation, whatever the panel reports.

use crate::discovery::ControlChannelDevice;
use crate::dpcd::{DSC_SUPPORT_OFFSET, DpcdRegister};
use crate::error::Result;

/// Value written to enable DSC
pub const DSC_ENABLE: u8 = 0x01;

/// How the raw register byte is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// `0` is off, `1` is on, anything else is indeterminate
    #[default]
    Exact,
    /// Bit 0 alone encodes support, so `0x03` is on
    Bit0,
}

/// When a write is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Write only when the decoded state is `Off`
    #[default]
    Conservative,
    /// Write only when `Off` and the device sits in a daisy chain
    DaisyChainTargeted,
    /// Write `1` on every run regardless of the decoded state
    Aggressive,
}

impl std::str::FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "exact" => Ok(DecodePolicy::Exact),
            "bit0" => Ok(DecodePolicy::Bit0),
            other => Err(format!("unknown decode policy '{}' (expected exact or bit0)", other)),
        }
    }
}

impl std::str::FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(WritePolicy::Conservative),
            "daisy-chain" => Ok(WritePolicy::DaisyChainTargeted),
            "aggressive" => Ok(WritePolicy::Aggressive),
            other => Err(format!(
                "unknown write policy '{}' (expected conservative, daisy-chain or aggressive)",
                other
            )),
        }
    }
}

impl std::fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodePolicy::Exact => write!(f, "exact"),
            DecodePolicy::Bit0 => write!(f, "bit0"),
        }
    }
}

impl std::fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritePolicy::Conservative => write!(f, "conservative"),
            WritePolicy::DaisyChainTargeted => write!(f, "daisy-chain"),
            WritePolicy::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Decoded DSC state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DscState {
    Off,
    On,
    Indeterminate,
}

impl DecodePolicy {
    pub fn decode(&self, raw: u8) -> DscState {
        match self {
            DecodePolicy::Exact => match raw {
                0 => DscState::Off,
                1 => DscState::On,
                _ => DscState::Indeterminate,
            },
            DecodePolicy::Bit0 => {
                if raw & 0x01 != 0 {
                    DscState::On
                } else {
                    DscState::Off
                }
            }
        }
    }
}

impl std::fmt::Display for DscState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DscState::Off => write!(f, "DSC Off"),
            DscState::On => write!(f, "DSC On"),
            DscState::Indeterminate => write!(f, "Unknown"),
        }
    }
}

/// Terminal result of one device update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DscOutcome {
    /// A write was issued; `after` is the re-read state
    Changed { before: u8, after: u8, verified: DscState },
    /// The panel already reports DSC on
    AlreadyOn { raw: u8 },
    /// The byte did not decode to on or off; left untouched
    LeftAlone { raw: u8 },
    /// Off, but the write policy does not target this device
    NotTargeted { raw: u8 },
}

impl DscOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, DscOutcome::Changed { .. })
    }
}

impl std::fmt::Display for DscOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DscOutcome::Changed { before, after, verified } => {
                write!(f, "changed (0x{:02X} -> 0x{:02X}, {})", before, after, verified)
            }
            DscOutcome::AlreadyOn { raw } => write!(f, "already on (0x{:02X})", raw),
            DscOutcome::LeftAlone { raw } => write!(f, "unknown state (0x{:02X}), left as is", raw),
            DscOutcome::NotTargeted { raw } => write!(f, "off (0x{:02X}), not targeted", raw),
        }
    }
}

/// Runs the read/decide/write/verify sequence with a fixed policy pair
#[derive(Debug, Clone, Copy, Default)]
pub struct DscMachine {
    pub decode: DecodePolicy,
    pub write: WritePolicy,
}

impl DscMachine {
    pub fn new(decode: DecodePolicy, write: WritePolicy) -> Self {
        Self { decode, write }
    }

    /// Read the current state without ever writing
    pub fn inspect<R: DpcdRegister>(&self, reg: &mut R) -> Result<(u8, DscState)> {
        let raw = reg.read_byte(DSC_SUPPORT_OFFSET)?;
        Ok((raw, self.decode.decode(raw)))
    }

    fn should_write(&self, state: DscState, device: &ControlChannelDevice) -> bool {
        match self.write {
            WritePolicy::Conservative => state == DscState::Off,
            WritePolicy::DaisyChainTargeted => state == DscState::Off && device.is_daisy_chained(),
            WritePolicy::Aggressive => true,
        }
    }

    /// Update one device
    ///
    /// Read failures end the sequence for this device; the caller decides
    /// whether to continue with the next one.
    pub fn update<R: DpcdRegister>(
        &self,
        device: &ControlChannelDevice,
        reg: &mut R,
    ) -> Result<DscOutcome> {
        let (raw, state) = self.inspect(reg)?;
        info!(
            device = %device.path.display(),
            "Current DSC value: {} (0x{:02X})",
            state,
            raw
        );

        if !self.should_write(state, device) {
            let outcome = match state {
                DscState::On => DscOutcome::AlreadyOn { raw },
                DscState::Indeterminate => DscOutcome::LeftAlone { raw },
                DscState::Off => DscOutcome::NotTargeted { raw },
            };
            info!(device = %device.path.display(), "No action taken: {}", outcome);
            return Ok(outcome);
        }

        if self.write == WritePolicy::Aggressive && state != DscState::Off {
            warn!(
                device = %device.path.display(),
                "Aggressive policy: forcing DSC on over current value 0x{:02X}",
                raw
            );
        } else {
            info!(
                device = %device.path.display(),
                "DSC is off; enabling by writing 1 to DPCD[0x{:03X}]",
                DSC_SUPPORT_OFFSET
            );
        }
        reg.write_byte(DSC_SUPPORT_OFFSET, DSC_ENABLE)?;

        let (after, verified) = self.inspect(reg)?;
        if verified == DscState::On {
            info!(device = %device.path.display(), "DSC write complete, panel reports {}", verified);
        } else {
            // Some panels don't reflect the write right away
            info!(
                device = %device.path.display(),
                "DSC write issued but panel reports {} (0x{:02X})",
                verified,
                after
            );
        }

        Ok(DscOutcome::Changed {
            before: raw,
            after,
            verified,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connector::{ConnectionStatus, ConnectorKind};
    use crate::dpcd::aux::AuxChannel;
    use crate::error::DscError;
    use std::io::Cursor;

    /// Panel that records every register access
    pub(crate) struct FakePanel {
        pub value: u8,
        /// When false, writes are accepted but not reflected on read
        pub sticky: bool,
        pub reads: usize,
        pub writes: Vec<(u64, u8)>,
    }

    impl FakePanel {
        pub fn new(value: u8) -> Self {
            Self {
                value,
                sticky: true,
                reads: 0,
                writes: Vec::new(),
            }
        }
    }

    impl DpcdRegister for FakePanel {
        fn read_byte(&mut self, offset: u64) -> Result<u8> {
            assert_eq!(offset, DSC_SUPPORT_OFFSET);
            self.reads += 1;
            Ok(self.value)
        }

        fn write_byte(&mut self, offset: u64, value: u8) -> Result<()> {
            self.writes.push((offset, value));
            if self.sticky {
                self.value = value;
            }
            Ok(())
        }
    }

    pub(crate) fn device(kind: ConnectorKind) -> ControlChannelDevice {
        ControlChannelDevice {
            path: "/dev/drm_dp_aux3".into(),
            connector_name: "card1-DP-3".to_string(),
            kind,
            status: ConnectionStatus::Connected,
        }
    }

    fn conservative() -> DscMachine {
        DscMachine::new(DecodePolicy::Exact, WritePolicy::Conservative)
    }

    #[test]
    fn test_decode_exact() {
        assert_eq!(DecodePolicy::Exact.decode(0x00), DscState::Off);
        assert_eq!(DecodePolicy::Exact.decode(0x01), DscState::On);
        assert_eq!(DecodePolicy::Exact.decode(0x03), DscState::Indeterminate);
    }

    #[test]
    fn test_decode_bit0() {
        assert_eq!(DecodePolicy::Bit0.decode(0x00), DscState::Off);
        assert_eq!(DecodePolicy::Bit0.decode(0x02), DscState::Off);
        assert_eq!(DecodePolicy::Bit0.decode(0x03), DscState::On);
    }

    #[test]
    fn test_off_is_enabled_and_verified() {
        let mut panel = FakePanel::new(0x00);
        let outcome = conservative().update(&device(ConnectorKind::External), &mut panel).unwrap();

        assert_eq!(
            outcome,
            DscOutcome::Changed { before: 0x00, after: 0x01, verified: DscState::On }
        );
        assert_eq!(panel.writes, vec![(DSC_SUPPORT_OFFSET, 0x01)]);
        // One decode read plus exactly one verification read
        assert_eq!(panel.reads, 2);
    }

    #[test]
    fn test_already_on_is_idempotent() {
        let mut panel = FakePanel::new(0x01);
        let machine = conservative();
        let dev = device(ConnectorKind::External);

        assert_eq!(machine.update(&dev, &mut panel).unwrap(), DscOutcome::AlreadyOn { raw: 0x01 });
        assert_eq!(machine.update(&dev, &mut panel).unwrap(), DscOutcome::AlreadyOn { raw: 0x01 });
        assert!(panel.writes.is_empty());
        assert_eq!(panel.value, 0x01);
    }

    #[test]
    fn test_second_run_after_enable_writes_nothing() {
        let mut panel = FakePanel::new(0x00);
        let machine = conservative();
        let dev = device(ConnectorKind::External);

        assert!(machine.update(&dev, &mut panel).unwrap().wrote());
        assert!(!machine.update(&dev, &mut panel).unwrap().wrote());
        assert_eq!(panel.writes.len(), 1);
    }

    #[test]
    fn test_unknown_value_left_alone() {
        let mut panel = FakePanel::new(0x03);
        let outcome = conservative().update(&device(ConnectorKind::External), &mut panel).unwrap();
        assert_eq!(outcome, DscOutcome::LeftAlone { raw: 0x03 });
        assert!(panel.writes.is_empty());
    }

    #[test]
    fn test_bit0_counts_three_as_supported() {
        let mut panel = FakePanel::new(0x03);
        let machine = DscMachine::new(DecodePolicy::Bit0, WritePolicy::Conservative);
        let outcome = machine.update(&device(ConnectorKind::External), &mut panel).unwrap();
        assert_eq!(outcome, DscOutcome::AlreadyOn { raw: 0x03 });
        assert!(panel.writes.is_empty());
    }

    #[test]
    fn test_daisy_chain_policy_skips_direct_monitors() {
        let machine = DscMachine::new(DecodePolicy::Exact, WritePolicy::DaisyChainTargeted);

        let mut direct = FakePanel::new(0x00);
        let outcome = machine.update(&device(ConnectorKind::External), &mut direct).unwrap();
        assert_eq!(outcome, DscOutcome::NotTargeted { raw: 0x00 });
        assert!(direct.writes.is_empty());

        let mut chained = FakePanel::new(0x00);
        let outcome = machine
            .update(&device(ConnectorKind::DaisyChained { position: 1 }), &mut chained)
            .unwrap();
        assert!(outcome.wrote());
        assert_eq!(chained.writes, vec![(DSC_SUPPORT_OFFSET, 0x01)]);
    }

    #[test]
    fn test_aggressive_writes_every_run() {
        let mut panel = FakePanel::new(0x01);
        let machine = DscMachine::new(DecodePolicy::Exact, WritePolicy::Aggressive);
        let dev = device(ConnectorKind::External);

        machine.update(&dev, &mut panel).unwrap();
        machine.update(&dev, &mut panel).unwrap();
        assert_eq!(panel.writes.len(), 2);

        let mut odd = FakePanel::new(0x7F);
        machine.update(&dev, &mut odd).unwrap();
        assert_eq!(odd.writes, vec![(DSC_SUPPORT_OFFSET, 0x01)]);
    }

    #[test]
    fn test_verification_mismatch_is_not_an_error() {
        let mut panel = FakePanel::new(0x00);
        panel.sticky = false;
        let outcome = conservative().update(&device(ConnectorKind::External), &mut panel).unwrap();
        assert_eq!(
            outcome,
            DscOutcome::Changed { before: 0x00, after: 0x00, verified: DscState::Off }
        );
    }

    #[test]
    fn test_read_failure_stops_before_write() {
        let mut aux = AuxChannel::new("/dev/drm_dp_aux3", Cursor::new(Vec::new()));
        let err = conservative()
            .update(&device(ConnectorKind::External), &mut aux)
            .unwrap_err();
        assert!(matches!(err, DscError::ShortRead { .. }));
        assert!(aux.into_inner().into_inner().is_empty());
    }

    #[test]
    fn test_end_to_end_over_aux_channel() {
        let mut space = vec![0u8; 0x200];
        space[0x160] = 0x00;
        let mut aux = AuxChannel::new("/dev/drm_dp_aux3", Cursor::new(space));

        let outcome = conservative().update(&device(ConnectorKind::External), &mut aux).unwrap();
        assert_eq!(outcome.to_string(), "changed (0x00 -> 0x01, DSC On)");
        assert_eq!(aux.into_inner().into_inner()[0x160], 0x01);
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!("bit0".parse::<DecodePolicy>().unwrap(), DecodePolicy::Bit0);
        assert_eq!("daisy-chain".parse::<WritePolicy>().unwrap(), WritePolicy::DaisyChainTargeted);
        assert!("force".parse::<WritePolicy>().is_err());
    }

    #[test]
    fn test_policy_names_match_parser() {
        for name in ["exact", "bit0"] {
            assert_eq!(name.parse::<DecodePolicy>().unwrap().to_string(), name);
        }
        for name in ["conservative", "daisy-chain", "aggressive"] {
            assert_eq!(name.parse::<WritePolicy>().unwrap().to_string(), name);
        }
    }
}
