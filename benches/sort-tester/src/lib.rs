use std::path::Path;

use common::{bench::Bench, error::ReportError, run::RunParams, util::fill_placeholders};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sweeps the external sort tester over every combination of the listed
/// maximum lengths, value ranges and modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortTester {
    pub trials: u32,
    pub initial_length: u64,
    pub length_increment: u64,
    pub max_lengths: Vec<u64>,
    #[serde(default = "default_min_values")]
    pub min_values: Vec<i64>,
    pub max_values: Vec<i64>,
    pub modes: Vec<String>,
    /// Output file name relative to the data directory, see [`SortTester::output_name`]
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_min_values() -> Vec<i64> {
    vec![0]
}

fn default_output() -> String {
    "{experiment}_{index}.csv".to_owned()
}

impl SortTester {
    /// Fills `{experiment}`, `{index}`, `{mode}`, `{max_length}`, `{min_value}`,
    /// `{max_value}` and `{trials}` in the output pattern
    pub fn output_name(
        &self,
        experiment: &str,
        index: usize,
        (max_length, min_value, max_value, mode): (u64, i64, i64, &str),
    ) -> Result<String, ReportError> {
        fill_placeholders(&self.output, |name| {
            Some(match name {
                "experiment" => experiment.to_owned(),
                "index" => index.to_string(),
                "mode" => mode.to_owned(),
                "max_length" => max_length.to_string(),
                "min_value" => min_value.to_string(),
                "max_value" => max_value.to_string(),
                "trials" => self.trials.to_string(),
                _ => return None,
            })
        })
    }
}

/// Benches provided by this crate. Called by the binary so the crate, and with
/// it the `typetag` registration, is linked in.
pub fn init_benches() -> Vec<&'static str> {
    vec!["SortTester"]
}

#[typetag::serde]
impl Bench for SortTester {
    fn name(&self) -> &'static str {
        "sort-tester"
    }

    fn runs(&self, experiment: &str, data_dir: &Path) -> Result<Vec<RunParams>, ReportError> {
        if self.max_lengths.is_empty()
            || self.min_values.is_empty()
            || self.max_values.is_empty()
            || self.modes.is_empty()
        {
            return Err(ReportError::Config(format!(
                "Experiment {experiment} has an empty parameter list"
            )));
        }
        let runs = iproduct!(
            self.max_lengths.iter().copied(),
            self.min_values.iter().copied(),
            self.max_values.iter().copied(),
            self.modes.iter()
        )
        .enumerate()
        .map(|(index, (max_length, min_value, max_value, mode))| {
            let name =
                self.output_name(experiment, index, (max_length, min_value, max_value, mode))?;
            let params = RunParams {
                trials: self.trials,
                initial_length: self.initial_length,
                length_increment: self.length_increment,
                max_length,
                min_value,
                max_value,
                mode: mode.clone(),
                output: data_dir.join(name),
            };
            params.validate()?;
            Ok(params)
        })
        .collect::<Result<Vec<_>, ReportError>>()?;
        debug!("Experiment {experiment} expands to {} runs", runs.len());
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use common::config::Config;

    use super::*;

    fn tester() -> SortTester {
        SortTester {
            trials: 30,
            initial_length: 1000,
            length_increment: 1000,
            max_lengths: vec![100_000],
            min_values: vec![0],
            max_values: vec![50_000, 1_000_000],
            modes: vec!["qr".to_owned(), "q".to_owned()],
            output: "{experiment}_{max_value}_{mode}.csv".to_owned(),
        }
    }

    #[test]
    fn expands_every_combination() {
        let runs = tester().runs("fig5", Path::new("data")).unwrap();
        let outputs = runs.iter().map(|r| r.output.clone()).collect::<Vec<_>>();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("data/fig5_50000_qr.csv"),
                PathBuf::from("data/fig5_50000_q.csv"),
                PathBuf::from("data/fig5_1000000_qr.csv"),
                PathBuf::from("data/fig5_1000000_q.csv"),
            ]
        );
        assert!(runs.iter().all(|r| r.trials == 30 && r.max_length == 100_000));
        assert_eq!(runs[2].max_value, 1_000_000);
        assert_eq!(runs[3].mode, "q");
    }

    #[test]
    fn default_output_uses_index() {
        let mut bench = tester();
        bench.output = default_output();
        let runs = bench.runs("radix", Path::new("out")).unwrap();
        assert_eq!(runs[3].output, PathBuf::from("out/radix_3.csv"));
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut bench = tester();
        bench.modes.clear();
        assert!(matches!(
            bench.runs("x", Path::new("data")),
            Err(ReportError::Config(_))
        ));
        let mut bench = tester();
        bench.output = "{seed}.csv".to_owned();
        assert!(bench.runs("x", Path::new("data")).is_err());
        let mut bench = tester();
        bench.min_values = vec![2_000_000];
        assert!(bench.runs("x", Path::new("data")).is_err());
    }

    #[test]
    fn parses_from_config() {
        let yaml = r#"
name: sorting
settings:
  program: ./sort_tester
  workers: 4
experiments:
  - name: fig5
    bench:
      type: SortTester
      trials: 30
      initial_length: 1000
      length_increment: 1000
      max_lengths: [100000]
      max_values: [50000]
      modes: [qr, q]
figures:
  - name: fig5
    panels:
      - source: fig5_0.csv
        transform:
          log: true
        annotation:
          text: "k = 50,000"
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.settings.workers, Some(4));
        assert_eq!(config.settings.dpi, 600);
        let experiment = &config.experiments[0];
        assert_eq!(experiment.bench.name(), "sort-tester");
        let runs = experiment.bench.runs(&experiment.name, Path::new("d")).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].output, PathBuf::from("d/fig5_1.csv"));
        assert_eq!(runs[0].min_value, 0);

        let panel = &config.figures[0].panels[0];
        assert!(panel.transform.log);
        assert_eq!(panel.annotation.as_ref().unwrap().x, 0.05);
        assert_eq!(config.figures[0].grid, (1, 1));
    }
}
