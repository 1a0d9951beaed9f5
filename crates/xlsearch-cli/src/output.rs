use anyhow::Context;
use csv::ByteRecord;
use rayon::prelude::*;
use xlsearch_core::candidates::Link;
use xlsearch_core::fragments::{Chain, IonClass};
use xlsearch_core::ion_series::Kind;
use xlsearch_core::scoring::{CrossLinkMatch, Fragments};
use xlsearch_core::search::SpectrumMatches;

use crate::runner::Runner;

/// Every reported match with a running identifier, in output order
fn numbered(results: &[SpectrumMatches]) -> Vec<(usize, &CrossLinkMatch)> {
    results
        .iter()
        .flat_map(|spectrum| spectrum.matches.iter())
        .enumerate()
        .collect()
}

fn link_type(link: &Link) -> &'static str {
    match link {
        Link::Cross { .. } => "cross",
        Link::Loop { .. } => "loop",
        Link::Mono { .. } => "mono",
    }
}

/// Link sites as 1-based residue positions. A loop link reports both sites
/// on the alpha peptide, a mono link only one
fn link_sites(link: &Link) -> (u16, Option<u16>) {
    match *link {
        Link::Cross {
            alpha_site,
            beta_site,
            ..
        } => (alpha_site + 1, Some(beta_site + 1)),
        Link::Loop { first, second, .. } => (first + 1, Some(second + 1)),
        Link::Mono { site, .. } => (site + 1, None),
    }
}

impl Runner {
    pub fn serialize_match(
        &self,
        psm_id: usize,
        m: &CrossLinkMatch,
        filename: &str,
    ) -> ByteRecord {
        let mut record = ByteRecord::new();
        let (alpha_site, beta_site) = link_sites(&m.candidate.link);

        record.push_field(itoa::Buffer::new().format(psm_id).as_bytes());
        record.push_field(self.database[m.candidate.alpha()].to_string().as_bytes());
        match m.candidate.beta() {
            Some(beta) => record.push_field(self.database[beta].to_string().as_bytes()),
            None => record.push_field(b""),
        }
        record.push_field(link_type(&m.candidate.link).as_bytes());
        record.push_field(itoa::Buffer::new().format(alpha_site).as_bytes());
        match beta_site {
            Some(site) => record.push_field(itoa::Buffer::new().format(site).as_bytes()),
            None => record.push_field(b""),
        }
        record.push_field(filename.as_bytes());
        record.push_field(m.spec_id.as_bytes());
        record.push_field(itoa::Buffer::new().format(m.rank).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.label).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.expmass).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.calcmass).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.charge).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.correction).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.adduct).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.precursor_ppm).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.ppm_errors.mean).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.score).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.fast_score).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.xcorrx).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.xcorrc).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.match_odds).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.match_odds_alpha).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.match_odds_beta).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.log_occupancy).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.wtic).as_bytes());
        record.push_field(ryu::Buffer::new().format(m.intsum).as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(m.matched_intensity_pct)
                .as_bytes(),
        );
        record.push_field(
            itoa::Buffer::new()
                .format(m.matched_linear_alpha)
                .as_bytes(),
        );
        record.push_field(itoa::Buffer::new().format(m.matched_linear_beta).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.matched_xlink_alpha).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.matched_xlink_beta).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.candidates).as_bytes());
        record.push_field(itoa::Buffer::new().format(m.prescored).as_bytes());
        record
    }

    pub fn serialize_fragments(
        &self,
        psm_id: usize,
        fragments_: &Option<Fragments>,
    ) -> Vec<ByteRecord> {
        let mut frag_records = vec![];

        if let Some(fragments) = fragments_ {
            for id in 0..fragments.fragment_ordinals.len() {
                let mut record = ByteRecord::new();
                record.push_field(itoa::Buffer::new().format(psm_id).as_bytes());
                let chain = match fragments.chains[id] {
                    Chain::Alpha => "alpha",
                    Chain::Beta => "beta",
                };
                record.push_field(chain.as_bytes());
                let class = match fragments.classes[id] {
                    IonClass::Linear => "linear",
                    IonClass::CrossLink => "xlink",
                };
                record.push_field(class.as_bytes());
                let ion_type = match fragments.kinds[id] {
                    Kind::A => "a",
                    Kind::B => "b",
                    Kind::C => "c",
                    Kind::X => "x",
                    Kind::Y => "y",
                    Kind::Z => "z",
                };
                record.push_field(ion_type.as_bytes());
                record.push_field(
                    itoa::Buffer::new()
                        .format(fragments.fragment_ordinals[id])
                        .as_bytes(),
                );
                record.push_field(itoa::Buffer::new().format(fragments.charges[id]).as_bytes());
                record.push_field(
                    ryu::Buffer::new()
                        .format(fragments.mz_calculated[id])
                        .as_bytes(),
                );
                record.push_field(
                    ryu::Buffer::new()
                        .format(fragments.mz_experimental[id])
                        .as_bytes(),
                );
                record.push_field(
                    ryu::Buffer::new()
                        .format(fragments.intensities[id])
                        .as_bytes(),
                );
                frag_records.push(record);
            }
        }

        frag_records
    }

    pub fn write_matches(&self, results: &[SpectrumMatches]) -> anyhow::Result<String> {
        let path = self.make_path("results.xlsearch.tsv");
        let filename = self.filename();

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "psm_id",
            "alpha",
            "beta",
            "link_type",
            "alpha_site",
            "beta_site",
            "filename",
            "scannr",
            "rank",
            "label",
            "expmass",
            "calcmass",
            "charge",
            "isotope_error",
            "adduct",
            "precursor_ppm",
            "fragment_ppm",
            "score",
            "fast_score",
            "xcorrx",
            "xcorrc",
            "match_odds",
            "match_odds_alpha",
            "match_odds_beta",
            "log_occupancy",
            "wtic",
            "intsum",
            "matched_intensity_pct",
            "matched_linear_alpha",
            "matched_linear_beta",
            "matched_xlink_alpha",
            "matched_xlink_beta",
            "scored_candidates",
            "prescored_candidates",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in numbered(results)
            .into_par_iter()
            .map(|(psm_id, m)| self.serialize_match(psm_id, m, &filename))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }

    pub fn write_fragments(&self, results: &[SpectrumMatches]) -> anyhow::Result<String> {
        let path = self.make_path("matched_fragments.xlsearch.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "psm_id",
            "chain",
            "ion_class",
            "fragment_type",
            "fragment_ordinals",
            "fragment_charge",
            "fragment_mz_calculated",
            "fragment_mz_experimental",
            "fragment_intensity",
        ]);

        wtr.write_byte_record(&headers)?;

        for record in numbered(results)
            .into_par_iter()
            .map(|(psm_id, m)| self.serialize_fragments(psm_id, &m.fragments))
            .flatten()
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }
}
