//! File channels 1..7.
//!
//! Channel 0 is the VM's standard output and never appears here.
//! `NOTE`/`POINT` express positions in 125-byte sectors, the unit the
//! classic disk operating system exposed.

use std::fs::File;

use crate::error::RuntimeError;

/// Bytes per sector for NOTE/POINT arithmetic.
pub const SECTOR_SIZE: u64 = 125;

/// Channel status codes exposed by STATUS.
pub mod status {
    pub const OK: u8 = 0;
    pub const END_OF_FILE: u8 = 3;
    pub const IO_ERROR: u8 = 144;
    pub const NOT_FOUND: u8 = 170;
    pub const INVALID: u8 = 1;
}

#[derive(Debug, Default)]
pub struct Channel {
    pub file: Option<File>,
    pub status: u8,
    pub position: u64,
}

/// The channel table. Index 0 is a permanently-closed placeholder so
/// channel numbers index directly.
#[derive(Debug, Default)]
pub struct ChannelSet {
    channels: [Channel; 8],
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validated access; channels outside 1..=7 are an error.
    pub fn get_mut(&mut self, channel: i64) -> Result<&mut Channel, RuntimeError> {
        if (1..=7).contains(&channel) {
            Ok(&mut self.channels[channel as usize])
        } else {
            Err(RuntimeError::InvalidChannel)
        }
    }

    /// The open file behind a channel, if any.
    pub fn open_file(&mut self, channel: usize) -> Option<&mut File> {
        self.channels.get_mut(channel).and_then(|c| c.file.as_mut())
    }

    pub fn status_of(&self, channel: i64) -> u8 {
        if (1..=7).contains(&channel) {
            self.channels[channel as usize].status
        } else {
            status::INVALID
        }
    }

    /// Close every channel, releasing the handles.
    pub fn close_all(&mut self) {
        for channel in &mut self.channels {
            channel.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_range_validation() {
        let mut set = ChannelSet::new();
        assert!(set.get_mut(0).is_err());
        assert!(set.get_mut(8).is_err());
        assert!(set.get_mut(-1).is_err());
        assert!(set.get_mut(1).is_ok());
        assert!(set.get_mut(7).is_ok());
    }

    #[test]
    fn test_status_of_invalid_channel() {
        let set = ChannelSet::new();
        assert_eq!(set.status_of(9), status::INVALID);
        assert_eq!(set.status_of(1), status::OK);
    }

    #[test]
    fn test_open_file_on_closed_channel() {
        let mut set = ChannelSet::new();
        assert!(set.open_file(3).is_none());
    }
}
