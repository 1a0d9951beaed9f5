pub mod alignment;
pub mod candidates;
pub mod database;
pub mod fragments;
pub mod ion_series;
pub mod mass;
pub mod peptide;
pub mod scoring;
pub mod search;
pub mod spectrum;
pub mod statistics;
pub mod topk;

use std::path::Path;

use mass::Tolerance;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidTolerance { name: String, tolerance: Tolerance },
    InvalidSequence(String),
    InvalidParameter(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::InvalidTolerance { name, tolerance } => write!(
                f,
                "invalid `{}`: {:?} must be a finite, non-empty window containing zero",
                name, tolerance
            ),
            Self::InvalidSequence(s) => write!(f, "invalid peptide sequence `{}`", s),
            Self::InvalidParameter(s) => write!(f, "invalid parameter: {}", s),
        }
    }
}

impl std::error::Error for Error {}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
    serde_json::from_str(&contents).map_err(Error::Json)
}
