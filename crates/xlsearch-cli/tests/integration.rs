use std::path::PathBuf;

use serde_json::json;
use xlsearch_cli::input::Input;
use xlsearch_cli::runner::Runner;
use xlsearch_core::candidates::{CrossLinker, Link, LinkCandidate, Offset};
use xlsearch_core::database::{Builder, IndexedDatabase, PeptideIx};
use xlsearch_core::fragments::{Chain, Fidelity, FragmentGenerator, LinkedIonGenerator};
use xlsearch_core::ion_series::Kind;

const PEPTIDES: [&str; 5] = ["LESKEEVR", "ELSKEEVR", "VLSKTEAR", "GDKAPLTR", "AKEGVLR"];

fn find(db: &IndexedDatabase, sequence: &str) -> PeptideIx {
    db.iter()
        .find(|(_, p)| p.sequence.as_ref() == sequence.as_bytes())
        .map(|(ix, _)| ix)
        .unwrap()
}

fn workspace(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("xlsearch-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&path).unwrap();
    path
}

/// Bundle with one spectrum of LESKEEVR x VLSKTEAR, and one empty spectrum
fn bundle() -> serde_json::Value {
    let records = PEPTIDES
        .iter()
        .map(|s| (s.to_string(), false))
        .collect::<Vec<_>>();
    let db = Builder::default().make_parameters().unwrap().build(&records);
    let linker = CrossLinker::default();

    let alpha = find(&db, "LESKEEVR");
    let beta = find(&db, "VLSKTEAR");
    let candidate = LinkCandidate {
        link: Link::Cross {
            alpha,
            beta,
            alpha_site: 3,
            beta_site: 3,
        },
        offset: Offset {
            correction: 0,
            adduct: 0.0,
        },
        monoisotopic: db[alpha].monoisotopic + db[beta].monoisotopic + linker.mass,
        order: 0,
    };

    let generator = LinkedIonGenerator::new(&db, vec![Kind::B, Kind::Y]);
    let mut peaks = [Chain::Alpha, Chain::Beta]
        .iter()
        .flat_map(|chain| generator.generate(&candidate, *chain, 3, Fidelity::Full))
        .map(|peak| (peak.mz, 100.0 * peak.intensity))
        .collect::<Vec<_>>();
    peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
    peaks.dedup_by(|a, b| (a.0 - b.0).abs() < 1E-4);

    json!({
        "peptides": PEPTIDES.iter().map(|s| json!({ "sequence": s })).collect::<Vec<_>>(),
        "spectra": [
            {
                "id": "scan=1",
                "precursor_mz": candidate.precursor_mz(3),
                "precursor_charge": 3,
                "mz": peaks.iter().map(|p| p.0).collect::<Vec<_>>(),
                "intensity": peaks.iter().map(|p| p.1).collect::<Vec<_>>(),
            },
            {
                "id": "scan=2",
                "precursor_mz": 4000.0,
                "precursor_charge": 2,
                "mz": [],
                "intensity": [],
            }
        ]
    })
}

#[test]
fn integration() -> anyhow::Result<()> {
    let dir = workspace("integration");
    let input_path = dir.join("bundle.json");
    std::fs::write(&input_path, serde_json::to_vec(&bundle())?)?;

    let input: Input = serde_json::from_value(json!({
        "precursor_tol": { "ppm": [-10.0, 10.0] },
        "fragment_tol": { "ppm": [-20.0, 20.0] },
        "report_psms": 5,
        "annotate_matches": true,
        "input_path": input_path.display().to_string(),
        "output_directory": dir.display().to_string(),
    }))?;

    let runner = Runner::new(input.build()?)?;
    let results = runner.search();
    assert_eq!(results.len(), 2);
    assert!(results[1].matches.is_empty());

    let search = runner.run()?;
    assert_eq!(search.output_paths.len(), 3);

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(dir.join("results.xlsearch.tsv"))?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name).unwrap();

    let rows = rdr.records().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(rows.len(), results[0].matches.len());
    let best = &rows[0];
    assert_eq!(&best[column("alpha")], "LESKEEVR");
    assert_eq!(&best[column("beta")], "VLSKTEAR");
    assert_eq!(&best[column("link_type")], "cross");
    assert_eq!(&best[column("alpha_site")], "4");
    assert_eq!(&best[column("beta_site")], "4");
    assert_eq!(&best[column("filename")], "bundle.json");
    assert_eq!(&best[column("scannr")], "scan=1");
    assert_eq!(&best[column("rank")], "1");
    assert_eq!(&best[column("label")], "1");
    assert_eq!(&best[column("isotope_error")], "0");

    let fragments = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(dir.join("matched_fragments.xlsearch.tsv"))?
        .records()
        .collect::<Result<Vec<_>, _>>()?;
    assert!(!fragments.is_empty());
    assert!(fragments.iter().any(|r| &r[2] == "xlink"));
    assert!(fragments.iter().any(|r| &r[1] == "beta"));

    let summary: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("results.json"))?)?;
    assert_eq!(summary["scoring"]["report_psms"], 5);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn missing_input_is_an_error() -> anyhow::Result<()> {
    let dir = workspace("missing");
    let input: Input = serde_json::from_value(json!({
        "input_path": dir.join("does-not-exist.json").display().to_string(),
        "output_directory": dir.display().to_string(),
    }))?;
    assert!(Runner::new(input.build()?).is_err());
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
