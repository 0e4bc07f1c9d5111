//! Error type returned when a module or a repair scheme cannot be built.

use std::fmt::{Display, Formatter};

/// Configuration errors detected before any simulation runs.
#[derive(Debug)]
pub enum Error {
    /// Chip geometry with a zero-sized field or an address wider than 64 bits.
    InvalidGeometry(String),
    /// BCH code other than SECDED, 3EC4ED and 6EC7ED.
    UnsupportedBch {
        /// Requested number of corrected bits.
        correct: usize,
        /// Requested number of detected bits.
        detect: usize,
    },
    /// Detection capacity is smaller than the correction capacity.
    DetectBelowCorrect {
        /// Requested number of corrected symbols.
        correct: usize,
        /// Requested number of detected symbols.
        detect: usize,
    },
    /// Symbol wider than an address, given as `log2` of its size in bits.
    InvalidSymbolSize(u32),
    /// In-DRAM code that cannot be built over a binary Galois field.
    InvalidInDramCode {
        /// Codeword size in bits.
        codeword: u32,
        /// Dataword size in bits.
        dataword: u32,
    },
    /// In-DRAM code with a single extra parity bit, which only adds detection.
    InDramDetectionUnsupported,
    /// Chip rows cannot be split into whole in-DRAM codewords.
    InDramGeometry(String),
    /// Software tolerance table with a wrong number of fault classes.
    ToleranceTableLength {
        /// Number of fault classes.
        expected: usize,
        /// Actual table length.
        found: usize,
    },
    /// Probability outside of `[0, 1]`.
    InvalidProbability(f64),
    /// Tiered repair keeps its redundant symbols in another rank.
    TooFewRanks,
    /// Failed to read a configuration file.
    Io(std::io::Error),
    /// Failed to parse a configuration file.
    Parse(serde_yaml::Error),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidGeometry(reason) => write!(f, "invalid chip geometry: {}", reason),
            Error::UnsupportedBch { correct, detect } => write!(f, "BCH {}EC{}ED not implemented", correct, detect),
            Error::DetectBelowCorrect { correct, detect } => write!(
                f,
                "cannot correct {} symbols while detecting only {} symbols",
                correct, detect
            ),
            Error::InvalidSymbolSize(log_size) => write!(f, "symbol of 2^{} bits is too wide", log_size),
            Error::InvalidInDramCode { codeword, dataword } => {
                write!(f, "in-DRAM BCH ({}, {}) code cannot be built", codeword, dataword)
            }
            Error::InDramDetectionUnsupported => write!(f, "in-DRAM error detection is not implemented"),
            Error::InDramGeometry(reason) => write!(f, "wrong chip size for in-DRAM BCH: {}", reason),
            Error::ToleranceTableLength { expected, found } => write!(
                f,
                "software tolerance table must have {} entries, got {}",
                expected, found
            ),
            Error::InvalidProbability(p) => write!(f, "probability {} is outside of [0, 1]", p),
            Error::TooFewRanks => write!(f, "tiered repair needs at least 2 ranks"),
            Error::Io(err) => write!(f, "cannot read config: {}", err),
            Error::Parse(err) => write!(f, "cannot parse config: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Parse(err)
    }
}

pub(crate) fn check_probability(p: f64) -> Result<f64> {
    if (0. ..=1.).contains(&p) {
        Ok(p)
    } else {
        Err(Error::InvalidProbability(p))
    }
}
