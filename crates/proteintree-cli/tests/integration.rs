use proteintree_cli::input::Input;
use proteintree_cli::runner::Runner;
use std::path::PathBuf;

const FASTA: &str = r#"
>sp|P1 first
TESTEIST
>sp|P2 second
ABCDETEI
"#;

fn workspace(name: &str) -> anyhow::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("proteintree-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("proteins.fasta"), FASTA)?;
    Ok(dir)
}

#[test]
fn integration() -> anyhow::Result<()> {
    let dir = workspace("mapping")?;
    std::fs::write(dir.join("peptides.txt"), "TEI\n\nDE\nWWW\n")?;
    let parameters = serde_json::json!({
        "fasta": dir.join("proteins.fasta"),
        "peptide_file": dir.join("peptides.txt"),
        "output_directory": dir.join("out"),
        "generate_decoys": true,
        "tree": { "max_node_size": 1 }
    });
    let path = dir.join("parameters.json");
    std::fs::write(&path, serde_json::to_vec(&parameters)?)?;

    let input = Input::load(path.to_string_lossy())?;
    let search = Runner::new(input.build()?)?.run()?;
    assert_eq!(search.peptides, vec!["TEI", "DE", "WWW"]);
    assert_eq!(search.output_paths.len(), 2);

    let tsv = std::fs::read_to_string(dir.join("out").join("peptide_mapping.tsv"))?;
    let lines = tsv.lines().collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "peptide\tmatched_sequence\taccession\tpositions",
            "TEI\tTEI\tsp|P1\t3",
            "TEI\tTEI\tsp|P2\t5",
            "DE\tDE\tsp|P2\t3",
        ]
    );

    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("out").join("results.json"))?)?;
    assert_eq!(results["matching_type"], "exact");
    assert_eq!(results["tree"]["max_node_size"], 1);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn combination_matching() -> anyhow::Result<()> {
    let dir = workspace("combination")?;
    let parameters = serde_json::json!({
        "fasta": dir.join("proteins.fasta"),
        "peptides": ["TEJ"],
        "matching_type": "combination",
        "output_directory": dir.join("out"),
    });
    let path = dir.join("parameters.json");
    std::fs::write(&path, serde_json::to_vec(&parameters)?)?;

    let search = Runner::new(Input::load(path.to_string_lossy())?.build()?)?.run()?;
    assert_eq!(search.output_paths.len(), 2);

    let tsv = std::fs::read_to_string(dir.join("out").join("peptide_mapping.tsv"))?;
    assert!(tsv.contains("TEJ\tTEI\tsp|P1\t3\n"));
    assert!(tsv.contains("TEJ\tTEI\tsp|P2\t5\n"));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
