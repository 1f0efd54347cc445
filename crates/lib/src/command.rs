//! IR command codec: raw hex capture text in, `sendir` request line out.
//!
//! Capture text is a whitespace-separated list of hex words:
//! `0000 <carrier> <repeat pair offset> <pair count> <pulse>...`. The first word
//! marks raw IR data, the second is the carrier period in gateway clock ticks.

/// Length of one gateway clock tick in microseconds.
const CLOCK_TICK_US: f64 = 0.241246;

/// Number of header words before the pulse list.
const HEADER_WORDS: usize = 4;

/// Why a raw capture string could not be turned into a [`PulseCommand`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("token {0:?} is not a hexadecimal word")]
    MalformedToken(String),
    #[error("data must contain at least 4 words, found {0}")]
    TooShort(usize),
    #[error("first word must be zero (0000), found {0:#06x}")]
    BadHeader(u32),
    #[error("carrier word must be non-zero")]
    ZeroCarrier,
    #[error("length does not match, expected {expected} pulses found {actual}")]
    LengthMismatch { expected: u64, actual: usize },
}

/// A validated IR command: carrier frequency, repeat offset, and pulse timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseCommand {
    name: String,
    frequency_hz: u32,
    repeat_pair_offset: u32,
    pulses: Vec<u32>,
}

impl PulseCommand {
    /// Parse raw capture text. `name` is only carried along for diagnostics.
    pub fn parse(name: impl Into<String>, raw: &str) -> Result<Self, ParseError> {
        let words = raw
            .split_whitespace()
            .map(parse_hex_word)
            .collect::<Result<Vec<u32>, ParseError>>()?;

        if words.len() < HEADER_WORDS {
            return Err(ParseError::TooShort(words.len()));
        }
        if words[0] != 0 {
            return Err(ParseError::BadHeader(words[0]));
        }
        if words[1] == 0 {
            return Err(ParseError::ZeroCarrier);
        }

        let frequency_hz = (1_000_000.0 / (f64::from(words[1]) * CLOCK_TICK_US)).round() as u32;
        let repeat_pair_offset = words[2];

        let expected = (u64::from(words[2]) + u64::from(words[3])) * 2;
        let actual = words.len() - HEADER_WORDS;
        if expected != actual as u64 {
            return Err(ParseError::LengthMismatch { expected, actual });
        }

        Ok(Self {
            name: name.into(),
            frequency_hz,
            repeat_pair_offset,
            pulses: words[HEADER_WORDS..].to_vec(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    pub fn repeat_pair_offset(&self) -> u32 {
        self.repeat_pair_offset
    }

    pub fn pulses(&self) -> &[u32] {
        &self.pulses
    }

    /// 1-based position in the pulse list where the repeated block starts, as
    /// the gateway expects it in the `sendir` offset field.
    pub fn sendir_offset(&self) -> u64 {
        u64::from(self.repeat_pair_offset) * 2 + 1
    }

    /// Build the CR-terminated `sendir` request for the given port and repeat count.
    /// Callers coerce the count with [`repeat_count`] first.
    pub fn to_sendir(&self, module_address: u32, connector_address: u32, repeat_count: u32) -> String {
        let mut line = format!(
            "sendir,{}:{},1,{},{},{}",
            module_address,
            connector_address,
            self.frequency_hz,
            repeat_count,
            self.sendir_offset()
        );
        for pulse in &self.pulses {
            line.push(',');
            line.push_str(&pulse.to_string());
        }
        line.push('\r');
        line
    }
}

/// Coerce a caller-supplied repeat count to the gateway minimum of 1.
pub fn repeat_count(count: i64) -> u32 {
    count.clamp(1, i64::from(u32::MAX)) as u32
}

fn parse_hex_word(token: &str) -> Result<u32, ParseError> {
    if !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::MalformedToken(token.to_string()));
    }
    u32::from_str_radix(token, 16).map_err(|_| ParseError::MalformedToken(token.to_string()))
}
