//! Binary encoding of [`PresetStore`]s.
//!
//! A persisted preset is a `bitcode` envelope: a [`PresetHeader`] (magic and
//! format version) plus the payload bytes of the store at that version.
//! bitcode is not self-describing, so a field can not simply be made
//! optional in place. Every format version keeps a frozen body layout here,
//! and older payloads are lifted to the current layout by the chained steps
//! of [`preset_migrations`](crate::migration::preset_migrations) before the
//! final decode.

use serde::{Deserialize, Serialize};

use crate::migration::{MigrationRegistry, preset_migrations};
use crate::preset::{CurvePreset, InputPreset, PresetStore, VolumeLayerPreset};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a persisted preset store.
pub const PRESET_MAGIC: u32 = 0x4B49_4C4E;

/// Current format version. Increment when the store gains a field.
pub const FORMAT_VERSION: u32 = 3;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PresetEncodeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PresetDecodeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", PRESET_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("preset from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error(transparent)]
    Migration(#[from] crate::migration::MigrationError),
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Header prepended to every persisted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetHeader {
    pub magic: u32,
    pub version: u32,
}

impl PresetHeader {
    pub fn new(version: u32) -> Self {
        Self {
            magic: PRESET_MAGIC,
            version,
        }
    }

    /// Accepts the current version and anything older.
    pub fn validate(&self) -> Result<(), PresetDecodeError> {
        if self.magic != PRESET_MAGIC {
            return Err(PresetDecodeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(PresetDecodeError::FutureVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PresetEnvelope {
    header: PresetHeader,
    payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Frozen body layouts
// ---------------------------------------------------------------------------

/// Version 1: asset name, parameter blob, curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetBodyV1 {
    pub asset_name: String,
    pub parameters: Vec<u8>,
    pub curves: Vec<CurvePreset>,
}

/// Version 2: adds input connections and volume layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetBodyV2 {
    pub asset_name: String,
    pub parameters: Vec<u8>,
    pub curves: Vec<CurvePreset>,
    pub inputs: Vec<InputPreset>,
    pub volume_layers: Vec<VolumeLayerPreset>,
}

// Version 3 is `PresetStore` itself.

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

pub(crate) fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PresetEncodeError> {
    bitcode::serialize(value).map_err(|e| PresetEncodeError::Encode(e.to_string()))
}

pub(crate) fn from_bytes<'de, T: Deserialize<'de>>(data: &'de [u8]) -> Result<T, PresetDecodeError> {
    bitcode::deserialize(data).map_err(|e| PresetDecodeError::Decode(e.to_string()))
}

/// Wrap an already-encoded body of `version` in an envelope.
pub fn encode_payload<T: Serialize>(version: u32, body: &T) -> Result<Vec<u8>, PresetEncodeError> {
    to_bytes(&PresetEnvelope {
        header: PresetHeader::new(version),
        payload: to_bytes(body)?,
    })
}

/// Encode `store` at the current format version.
pub fn encode_preset(store: &PresetStore) -> Result<Vec<u8>, PresetEncodeError> {
    encode_payload(FORMAT_VERSION, store)
}

/// Read just the header of a persisted store.
pub fn read_preset_header(data: &[u8]) -> Result<PresetHeader, PresetDecodeError> {
    let envelope: PresetEnvelope = from_bytes(data)?;
    Ok(envelope.header)
}

/// Decode a persisted store of any supported version.
pub fn decode_preset(data: &[u8]) -> Result<PresetStore, PresetDecodeError> {
    decode_preset_with(data, &preset_migrations())
}

pub fn decode_preset_with(
    data: &[u8],
    migrations: &MigrationRegistry,
) -> Result<PresetStore, PresetDecodeError> {
    let envelope: PresetEnvelope = from_bytes(data)?;
    envelope.header.validate()?;
    let payload = migrations.migrate(&envelope.payload, envelope.header.version, FORMAT_VERSION)?;
    from_bytes(&payload)
}
