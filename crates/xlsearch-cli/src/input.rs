use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use xlsearch_core::mass::Tolerance;
use xlsearch_core::spectrum::{Peak, ProcessedSpectrum};
use xlsearch_core::{database, scoring};

#[derive(Serialize)]
/// Actual search parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub database: database::Parameters,
    pub scoring: scoring::Parameters,
    pub input_path: String,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize)]
/// Input search parameters deserialized from JSON file
pub struct Input {
    database: Option<database::Builder>,
    #[serde(flatten)]
    scoring: scoring::Builder,
    input_path: Option<String>,
    output_directory: Option<String>,
}

/// Candidate peptide sequence
#[derive(Deserialize, Debug)]
pub struct PeptideRecord {
    pub sequence: String,
    #[serde(default)]
    pub decoy: bool,
}

/// Centroided MS2 spectrum, peaks as parallel arrays
#[derive(Deserialize, Debug)]
pub struct SpectrumRecord {
    pub id: String,
    pub precursor_mz: f32,
    pub precursor_charge: u8,
    pub mz: Vec<f32>,
    pub intensity: Vec<f32>,
    /// Per-peak charge annotation from deisotoping, if any
    pub charges: Option<Vec<Option<u8>>>,
}

impl SpectrumRecord {
    pub fn process(self, file_id: usize) -> anyhow::Result<ProcessedSpectrum> {
        ensure!(
            self.mz.len() == self.intensity.len(),
            "spectrum `{}`: {} m/z values but {} intensities",
            self.id,
            self.mz.len(),
            self.intensity.len()
        );
        let charges = self.charges.unwrap_or_else(|| vec![None; self.mz.len()]);
        ensure!(
            charges.len() == self.mz.len(),
            "spectrum `{}`: {} m/z values but {} charges",
            self.id,
            self.mz.len(),
            charges.len()
        );

        let peaks = self
            .mz
            .into_iter()
            .zip(self.intensity)
            .zip(charges)
            .map(|((mz, intensity), charge)| Peak {
                mz,
                intensity,
                charge,
            })
            .collect();

        Ok(ProcessedSpectrum::new(
            self.id,
            file_id,
            self.precursor_mz,
            self.precursor_charge,
            peaks,
        ))
    }
}

/// Peptides and spectra to search, deserialized from a JSON file
#[derive(Deserialize, Debug)]
pub struct Bundle {
    pub peptides: Vec<PeptideRecord>,
    pub spectra: Vec<SpectrumRecord>,
}

impl Bundle {
    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        xlsearch_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    /// Split into `(sequence, decoy)` records for the index and processed spectra
    pub fn into_parts(self) -> anyhow::Result<(Vec<(String, bool)>, Vec<ProcessedSpectrum>)> {
        let records = self
            .peptides
            .into_iter()
            .map(|record| (record.sequence, record.decoy))
            .collect();
        let spectra = self
            .spectra
            .into_iter()
            .map(|spectrum| spectrum.process(0))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((records, spectra))
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("required parameters")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(input_path) = matches.get_one::<String>("input") {
            log::trace!("overriding `input_path` parameter.");
            input.input_path = Some(input_path.into());
        }
        if matches.get_flag("annotate-matches") {
            input.scoring.annotate_matches = Some(true);
        }

        ensure!(
            input.input_path.is_some(),
            "`input_path` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        xlsearch_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    fn check_tolerances(tolerance: Option<&Tolerance>) {
        let (lo, hi) = match tolerance {
            Some(Tolerance::Ppm(lo, hi)) | Some(Tolerance::Da(lo, hi)) => (lo, hi),
            None => return,
        };
        if hi.abs() > lo.abs() {
            log::warn!(
                "Tolerances are applied to experimental masses, not theoretical: [{} - {}]",
                lo,
                hi
            );
        }
    }

    pub fn build(self) -> anyhow::Result<Search> {
        Self::check_tolerances(self.scoring.precursor_tol.as_ref());
        Self::check_tolerances(self.scoring.fragment_tol.as_ref());

        let database = self.database.unwrap_or_default().make_parameters()?;
        let scoring = self.scoring.make_parameters()?;

        let input_path = self
            .input_path
            .context("'input_path' must be provided!")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            database,
            scoring,
            input_path,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}
