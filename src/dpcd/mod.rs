// SPDX-License-Identifier: GPL-3.0-only
//! DPCD register access
//!
//! The panel's DPCD space is exposed by the kernel as a `drm_dp_aux*`
//! character device where the file offset is the DPCD address.

pub mod aux;

use crate::error::Result;

/// DPCD address of the DSC support/enable byte
pub const DSC_SUPPORT_OFFSET: u64 = 0x160;

/// Offset-addressed single byte access to a panel's DPCD space
pub trait DpcdRegister {
    /// Seek to `offset` and read exactly one byte
    fn read_byte(&mut self, offset: u64) -> Result<u8>;

    /// Seek to `offset` and write exactly one byte
    fn write_byte(&mut self, offset: u64, value: u8) -> Result<()>;
}
