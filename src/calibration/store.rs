//! Non-volatile calibration record
//!
//! A single fixed little-endian record at offset 0 of storage: a magic word
//! and version byte framing the autoconfiguration target baseline and the 24
//! per-key maximum deltas. Anything that does not frame correctly is treated
//! as absent and replaced by defaults, never migrated.

use log::{info, warn};
use nom::multi::count;
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;

use crate::constants::{DEFAULT_MAX_DELTA, DEFAULT_TARGET_BASELINE, NUM_KEYS};
use crate::hal::NvStorage;
use crate::Result;

/// Magic word identifying a calibration record
pub const RECORD_MAGIC: u16 = 0xBEEF;

/// Layout version this firmware reads and writes
pub const RECORD_VERSION: u8 = 3;

/// Serialized size: 6-byte header plus 24 little-endian deltas
pub const RECORD_LEN: usize = 6 + NUM_KEYS * 2;

/// Storage offset of the record
pub const RECORD_OFFSET: usize = 0;

/// Persisted calibration values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationRecord {
    /// Autoconfiguration baseline target the keyboard was calibrated at
    pub target_baseline: u16,
    /// Maximum observed delta per key, in raw counts
    pub max_delta: [u16; NUM_KEYS],
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        CalibrationRecord {
            target_baseline: DEFAULT_TARGET_BASELINE,
            max_delta: [DEFAULT_MAX_DELTA; NUM_KEYS],
        }
    }
}

impl CalibrationRecord {
    /// Serialize to the fixed little-endian layout
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[0..2].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        bytes[2] = RECORD_VERSION;
        bytes[3] = 0; // reserved
        bytes[4..6].copy_from_slice(&self.target_baseline.to_le_bytes());
        for (key, delta) in self.max_delta.iter().enumerate() {
            let at = 6 + key * 2;
            bytes[at..at + 2].copy_from_slice(&delta.to_le_bytes());
        }
        bytes
    }

    /// Parse the fixed layout, failing on magic or version mismatch
    pub fn parse(input: &[u8]) -> IResult<&[u8], CalibrationRecord> {
        use nom::bytes::complete::tag;
        let (input, _magic) = tag(RECORD_MAGIC.to_le_bytes().as_slice())(input)?;
        let (input, _version) = tag([RECORD_VERSION].as_slice())(input)?;
        let (input, _reserved) = le_u8(input)?;
        let (input, target_baseline) = le_u16(input)?;
        let (input, deltas) = count(le_u16, NUM_KEYS)(input)?;

        let mut max_delta = [0u16; NUM_KEYS];
        max_delta.copy_from_slice(&deltas);
        Ok((
            input,
            CalibrationRecord {
                target_baseline,
                max_delta,
            },
        ))
    }

    /// Load the record from storage
    ///
    /// A record that does not parse (absent, wrong magic, other version)
    /// yields the defaults with a prominent warning; only a failing storage
    /// read is an error.
    pub fn load(storage: &mut dyn NvStorage) -> Result<CalibrationRecord> {
        let mut bytes = [0u8; RECORD_LEN];
        storage.read(RECORD_OFFSET, &mut bytes)?;
        match Self::parse(&bytes) {
            Ok((_, record)) => {
                info!(
                    "calibration record loaded (target baseline {})",
                    record.target_baseline
                );
                Ok(record)
            }
            Err(_) => {
                warn!("no valid calibration record found in storage");
                warn!("running on default sensitivity; a calibration pass is strongly recommended");
                Ok(CalibrationRecord::default())
            }
        }
    }

    /// Write the record to storage in a single operation
    pub fn save(&self, storage: &mut dyn NvStorage) -> Result<()> {
        storage.write(RECORD_OFFSET, &self.to_bytes())?;
        info!("calibration record saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimRig;

    #[test]
    fn test_round_trip_is_bit_exact() {
        let mut record = CalibrationRecord::default();
        record.target_baseline = 850;
        for (key, delta) in record.max_delta.iter_mut().enumerate() {
            *delta = 300 + key as u16 * 7;
        }

        let bytes = record.to_bytes();
        let (rest, parsed) = CalibrationRecord::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, record);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_layout_is_little_endian() {
        let record = CalibrationRecord::default();
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 54);
        assert_eq!(&bytes[0..2], &[0xEF, 0xBE]);
        assert_eq!(bytes[2], 3);
        assert_eq!(&bytes[4..6], &[0x26, 0x02]); // 550
        assert_eq!(&bytes[6..8], &[0x90, 0x01]); // 400
    }

    #[test]
    fn test_bad_magic_loads_defaults() {
        let mut rig = SimRig::new();
        let mut bytes = CalibrationRecord::default().to_bytes();
        bytes[0] = 0x00;
        rig.parts().storage.write(RECORD_OFFSET, &bytes).unwrap();

        let record = CalibrationRecord::load(rig.parts().storage).unwrap();
        assert_eq!(record, CalibrationRecord::default());
    }

    #[test]
    fn test_other_version_loads_defaults() {
        let mut rig = SimRig::new();
        let mut record = CalibrationRecord::default();
        record.max_delta[0] = 999;
        let mut bytes = record.to_bytes();
        bytes[2] = RECORD_VERSION + 1;
        rig.parts().storage.write(RECORD_OFFSET, &bytes).unwrap();

        let loaded = CalibrationRecord::load(rig.parts().storage).unwrap();
        assert_eq!(loaded, CalibrationRecord::default());
    }

    #[test]
    fn test_save_then_load() {
        let mut rig = SimRig::new();
        let mut record = CalibrationRecord::default();
        record.max_delta[5] = 412;
        record.save(rig.parts().storage).unwrap();

        let loaded = CalibrationRecord::load(rig.parts().storage).unwrap();
        assert_eq!(loaded, record);
    }
}
