//! Modbus register descriptions and value codecs.
//!
//! A register is described by its start address, its width in 16-bit words and
//! whether it holds device configuration rather than a measurement. The codec
//! turns the raw register content into the real value reported upstream and back.
//!
//! Raw content is the big-endian concatenation of the register words, so a
//! two-word register `[0x0001, 0x0002]` has the raw value `0x0001_0002`.
use serde::Deserialize;
use strum_macros::AsRefStr;

use crate::constants::MAX_REGISTER_WORDS;
use crate::error::RegisterError;

/// Conversion between raw register content and real values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Codec {
    /// Raw unsigned content is the value.
    #[default]
    Identity,
    /// Two's complement integer as wide as the register.
    Signed,
    /// IEEE-754 single precision float held in two words.
    Float32,
    /// Linear conversion: `raw * factor + offset`.
    Scaled {
        factor: f64,
        #[serde(default)]
        offset: f64,
    },
}

fn bits(size: u16) -> u32 {
    u32::from(size) * 16
}

fn mask(size: u16) -> u64 {
    let bits = bits(size);
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

impl Codec {
    /// Checks the codec can be applied to a register of `size` words.
    pub fn validate(&self, size: u16) -> Result<(), RegisterError> {
        match self {
            Codec::Float32 if size != 2 => Err(RegisterError::CodecSizeMismatch {
                codec: self.as_ref().to_string(),
                size,
            }),
            Codec::Scaled { factor, offset }
                if *factor == 0.0 || !factor.is_finite() || !offset.is_finite() =>
            {
                Err(RegisterError::InvalidScale {
                    factor: *factor,
                    offset: *offset,
                })
            }
            _ => Ok(()),
        }
    }

    /// Converts raw register content into a real value.
    ///
    /// `size` must be a validated register width.
    fn decode(&self, raw: u64, size: u16) -> f64 {
        match self {
            Codec::Identity => raw as f64,
            Codec::Signed => {
                let shift = 64 - bits(size);
                (((raw << shift) as i64) >> shift) as f64
            }
            Codec::Float32 => f64::from(f32::from_bits(raw as u32)),
            Codec::Scaled { factor, offset } => raw as f64 * factor + offset,
        }
    }

    /// Converts a real value into raw register content.
    ///
    /// Values outside the register range saturate at its bounds. `size` must be
    /// a validated register width.
    fn encode(&self, value: f64, size: u16) -> u64 {
        match self {
            Codec::Identity => (value.round() as u64).min(mask(size)),
            Codec::Signed => {
                let bits = bits(size);
                let (min, max) = if bits >= 64 {
                    (i64::MIN, i64::MAX)
                } else {
                    (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
                };
                ((value.round() as i64).clamp(min, max) as u64) & mask(size)
            }
            Codec::Float32 => u64::from((value as f32).to_bits()),
            Codec::Scaled { factor, offset } => {
                (((value - offset) / factor).round() as u64).min(mask(size))
            }
        }
    }
}

fn default_size() -> u16 {
    1
}

/// Register entry as written in the configuration file, before validation.
#[derive(Deserialize)]
struct RegisterEntry {
    addr: u16,
    #[serde(default = "default_size")]
    size: u16,
    #[serde(default)]
    cfgreg: bool,
    #[serde(default)]
    codec: Codec,
}

impl TryFrom<RegisterEntry> for ModbusRegister {
    type Error = RegisterError;

    fn try_from(entry: RegisterEntry) -> Result<Self, Self::Error> {
        let register = Self {
            addr: entry.addr,
            size: entry.size,
            cfgreg: entry.cfgreg,
            codec: entry.codec,
        };
        register.validate()?;
        Ok(register)
    }
}

/// Modbus register description.
///
/// Every instance has passed [`ModbusRegister::validate`]: builders and
/// deserialization refuse invalid sizes, spans and codecs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RegisterEntry")]
pub struct ModbusRegister {
    /// Register address.
    addr: u16,
    /// Register size, in 16 bits words.
    size: u16,
    /// True if this register is a configuration one.
    cfgreg: bool,
    /// Decoder applied on read, encoder applied on write.
    codec: Codec,
}

impl ModbusRegister {
    /// A single-word measurement register with the identity codec.
    pub fn new(addr: u16) -> Self {
        Self {
            addr,
            size: default_size(),
            cfgreg: false,
            codec: Codec::Identity,
        }
    }

    pub fn addr(&self) -> u16 {
        self.addr
    }

    /// Width in 16-bit words.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// True for configuration registers.
    pub fn is_configuration(&self) -> bool {
        self.cfgreg
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Sets the register width.
    pub fn with_size(mut self, size: u16) -> Result<Self, RegisterError> {
        self.size = size;
        self.validate()?;
        Ok(self)
    }

    /// Marks the register as a configuration register.
    pub fn configuration(mut self) -> Self {
        self.cfgreg = true;
        self
    }

    /// Sets the codec.
    pub fn with_codec(mut self, codec: Codec) -> Result<Self, RegisterError> {
        self.codec = codec;
        self.validate()?;
        Ok(self)
    }

    /// Checks size, address span and codec compatibility.
    pub fn validate(&self) -> Result<(), RegisterError> {
        if self.size == 0 || self.size > MAX_REGISTER_WORDS {
            return Err(RegisterError::InvalidSize(self.size));
        }
        self.end_addr()?;
        self.codec.validate(self.size)
    }

    /// Address of the last word covered by this register.
    pub fn end_addr(&self) -> Result<u16, RegisterError> {
        self.addr
            .checked_add(self.size.saturating_sub(1))
            .ok_or(RegisterError::AddressOverflow {
                addr: self.addr,
                size: self.size,
            })
    }

    /// Assembles the raw register content from the words read on the bus.
    pub fn raw_from_words(&self, words: &[u16]) -> Result<u64, RegisterError> {
        if words.len() != usize::from(self.size) {
            return Err(RegisterError::WordCountMismatch {
                addr: self.addr,
                expected: self.size,
                actual: words.len(),
            });
        }

        Ok(words
            .iter()
            .fold(0u64, |acc, word| (acc << 16) | u64::from(*word)))
    }

    /// Decodes the words read on the bus into the real value.
    pub fn decode(&self, words: &[u16]) -> Result<f64, RegisterError> {
        let raw = self.raw_from_words(words)?;
        Ok(self.codec.decode(raw, self.size))
    }

    /// Encodes a real value into the words to write on the bus.
    pub fn encode(&self, value: f64) -> Vec<u16> {
        let raw = self.codec.encode(value, self.size);
        (0..self.size)
            .rev()
            .map(|index| (raw >> (u32::from(index) * 16)) as u16)
            .collect()
    }
}
