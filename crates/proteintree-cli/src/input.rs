use anyhow::{ensure, Context};
use clap::ArgMatches;
use proteintree_core::tree::{Builder, Parameters};
use proteintree_core::MatchingType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual mapping parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub tree: Parameters,
    pub fasta: String,
    pub decoy_tag: String,
    pub generate_decoys: bool,
    pub matching_type: MatchingType,
    pub tolerance: Option<f64>,
    pub peptides: Vec<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input mapping parameters deserialized from JSON file
pub struct Input {
    tree: Option<Builder>,
    fasta: Option<String>,
    decoy_tag: Option<String>,
    generate_decoys: Option<bool>,
    matching_type: Option<MatchingType>,
    tolerance: Option<f64>,
    peptides: Option<Vec<String>>,
    peptide_file: Option<String>,
    output_directory: Option<String>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing parameter file")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(fasta) = matches.get_one::<String>("fasta") {
            log::trace!("overriding `fasta` parameter.");
            input.fasta = Some(fasta.into());
        }
        if let Some(peptides) = matches.get_many::<String>("peptides") {
            log::trace!("overriding `peptides` parameter.");
            input.peptides = Some(peptides.into_iter().map(|p| p.into()).collect());
            input.peptide_file = None;
        }
        if let Some(matching_type) = matches.get_one::<String>("matching") {
            log::trace!("overriding `matching_type` parameter.");
            input.matching_type = Some(matching_type.parse()?);
        }
        if let Some(tolerance) = matches.get_one::<f64>("tolerance").copied() {
            log::trace!("overriding `tolerance` parameter.");
            input.tolerance = Some(tolerance);
        }

        ensure!(
            input.fasta.is_some(),
            "`fasta` must be set. For more information try '--help'"
        );
        ensure!(
            input.peptides.is_some() || input.peptide_file.is_some(),
            "`peptides` or `peptide_file` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        proteintree_core::read_json(path).map_err(anyhow::Error::from)
    }

    fn read_peptides(path: &str) -> anyhow::Result<Vec<String>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read peptides from `{path}`"))?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let tree = self.tree.unwrap_or_default().make_parameters()?;

        let matching_type = self.matching_type.unwrap_or(MatchingType::Exact);
        let tolerance = match matching_type {
            MatchingType::Indistinguishable => {
                let tolerance = self.tolerance.context(
                    "`tolerance` must be set for indistinguishable matching",
                )?;
                ensure!(
                    tolerance.is_finite() && tolerance >= 0.0,
                    "`tolerance` must be a non-negative number of Da, got {tolerance}"
                );
                Some(tolerance)
            }
            _ => {
                if self.tolerance.is_some() {
                    log::warn!("`tolerance` is only used for indistinguishable matching");
                }
                None
            }
        };

        let peptides = match (self.peptides, self.peptide_file) {
            (Some(peptides), _) => peptides,
            (None, Some(path)) => Self::read_peptides(&path)?,
            (None, None) => Vec::new(),
        };
        if peptides.is_empty() {
            log::warn!("no peptides to map");
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path)?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            tree,
            fasta: self.fasta.context("'fasta' must be provided!")?,
            decoy_tag: self.decoy_tag.unwrap_or_else(|| "rev_".into()),
            generate_decoys: self.generate_decoys.unwrap_or(false),
            matching_type,
            tolerance,
            peptides,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}
