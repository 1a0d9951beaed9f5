use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::Context;
use log::info;
use xlsearch_core::database::IndexedDatabase;
use xlsearch_core::scoring::Scorer;
use xlsearch_core::search::{restrict_to_spectra, Search as CoreSearch, SpectrumMatches};
use xlsearch_core::spectrum::ProcessedSpectrum;

use super::input::{Bundle, Search};

pub struct Runner {
    pub database: IndexedDatabase,
    pub parameters: Search,
    pub spectra: Vec<ProcessedSpectrum>,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();

        let bundle = Bundle::load(&parameters.input_path)
            .with_context(|| format!("Failed to read input from `{}`", parameters.input_path))?;
        let (records, spectra) = bundle.into_parts()?;

        let mut database = parameters.database.build(&records);
        info!(
            "indexed {} peptides in {:#?}",
            database.len(),
            start.elapsed()
        );

        let removed = restrict_to_spectra(&mut database, &parameters.scoring, &spectra);
        if removed > 0 {
            info!(
                "- removed {} peptides too heavy for any precursor",
                removed
            );
        }
        info!("loaded {} spectra", spectra.len());

        Ok(Self {
            database,
            parameters,
            spectra,
            start,
        })
    }

    // Create a path for `file_name` in the specified output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    /// Name of the input file, used to label output rows
    pub(crate) fn filename(&self) -> String {
        Path::new(&self.parameters.input_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.parameters.input_path.clone())
    }

    pub fn search(&self) -> Vec<SpectrumMatches> {
        let scorer = Scorer::new(&self.database, self.parameters.scoring.clone());
        let stop = AtomicBool::new(false);
        CoreSearch::new(scorer).run(&self.spectra, &stop)
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let results = self.search();

        let matched = results
            .iter()
            .filter(|spectrum| !spectrum.matches.is_empty())
            .count();
        info!(
            "matched {} of {} spectra to at least one candidate",
            matched,
            results.len()
        );
        log::trace!("writing outputs");

        let path = self.write_matches(&results)?;
        self.parameters.output_paths.push(path);

        if self.parameters.scoring.annotate_matches {
            let path = self.write_fragments(&results)?;
            self.parameters.output_paths.push(path);
        }

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}
