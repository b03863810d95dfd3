use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path, path::PathBuf};
use tabstat::cluster::KMeans;
use tabstat::decompose::Model;
use tabstat::forecast::Order;
use tabstat::hypothesis::{Anova, TTest};
use tabstat::missing::{ColumnPolicy, EdgePolicy, FillPolicy, Scalar};
use tabstat::outliers::Correction;
use tabstat::source::SourceOptions;
use tabstat::synth::Dataset;
use tabstat::table::Case;
use tabstat::transform::Step;

/// Pipeline configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    pub outliers: Option<OutlierConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<Step>,
    pub split: Option<SplitConfig>,
    #[serde(default)]
    pub describe: DescribeConfig,
    pub decompose: Option<DecomposeConfig>,
    pub forecast: Option<ForecastConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Input file, relative to the work directory.
    pub file: PathBuf,
    #[serde(default)]
    pub options: SourceOptions,
}

#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleaningConfig {
    pub drop_columns: Vec<String>,
    pub drop_duplicates: bool,
    pub case: Vec<CaseRule>,
    pub missing: Vec<ColumnPolicy>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseRule {
    pub column: String,
    pub case: Case,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlierConfig {
    pub columns: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub ddof: usize,
    pub correction: Correction,
}

/// Shuffled train/test split of the cleaned table.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescribeConfig {
    /// Column pairs whose Pearson correlation is reported.
    pub correlations: Vec<(String, String)>,
    pub ttests: Vec<TTest>,
    pub anova: Vec<Anova>,
    pub kmeans: Option<KMeansConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KMeansConfig {
    pub columns: Vec<String>,
    pub k: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_n_init")]
    pub n_init: usize,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
}

impl KMeansConfig {
    pub fn kmeans(&self) -> KMeans {
        KMeans {
            k: self.k,
            n_init: self.n_init,
            max_iter: self.max_iter,
            seed: self.seed,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecomposeConfig {
    pub column: String,
    pub model: Model,
    /// Seasonal period; inferred from the index when absent.
    pub period: Option<usize>,
    /// Largest lag searched by the stationarity test.
    pub adf_max_lag: Option<usize>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    pub column: String,
    pub order: Order,
    pub horizon: usize,
}

fn default_threshold() -> f64 {
    3.0
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_n_init() -> usize {
    10
}

fn default_max_iter() -> usize {
    300
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&text).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let text = toml::to_string(self).context("failed to serialize config")?;
        fs::write(file, text).with_context(|| format!("failed to write {file:?}"))?;
        Ok(())
    }

    /// Configuration matching a generated sample dataset stored in `file`.
    pub fn template(dataset: Dataset, file: PathBuf) -> Self {
        let policy = |column: &str, policy: FillPolicy| ColumnPolicy {
            column: column.to_string(),
            policy,
        };
        let mut config = Config {
            source: SourceConfig {
                file,
                options: SourceOptions::default(),
            },
            cleaning: CleaningConfig::default(),
            outliers: None,
            transform: Vec::new(),
            split: None,
            describe: DescribeConfig::default(),
            decompose: None,
            forecast: None,
        };
        match dataset {
            Dataset::Income => {
                config.outliers = Some(OutlierConfig {
                    columns: vec!["Age".to_string(), "Income".to_string()],
                    threshold: 2.5,
                    ddof: 0,
                    correction: Correction::DropRow,
                });
                config.transform = vec![Step::Cut {
                    column: "Age".to_string(),
                    into: "AgeGroup".to_string(),
                    edges: vec![19.0, 30.0, 45.0, 60.0],
                    labels: vec!["young".into(), "middle".into(), "senior".into()],
                }];
                config.split = Some(SplitConfig {
                    test_fraction: 0.2,
                    seed: 42,
                });
                config.describe.correlations = vec![("Age".to_string(), "Income".to_string())];
                config.describe.ttests = vec![TTest::OneSample {
                    column: "Income".to_string(),
                    popmean: 50_000.0,
                }];
                config.describe.anova = vec![Anova::GroupBy {
                    value: "Income".to_string(),
                    by: "AgeGroup".to_string(),
                }];
                config.describe.kmeans = Some(KMeansConfig {
                    columns: vec!["Age".to_string(), "Income".to_string()],
                    k: 3,
                    seed: 0,
                    n_init: default_n_init(),
                    max_iter: default_max_iter(),
                });
            }
            Dataset::Passengers => {
                config.source.options.index_column = Some(SAMPLE_INDEX.to_string());
                config.source.options.parse_dates = true;
                config.cleaning.missing = vec![policy(
                    "Passengers",
                    FillPolicy::Interpolate {
                        edge: EdgePolicy::Nearest,
                    },
                )];
                config.transform = vec![Step::Difference {
                    column: "Passengers".to_string(),
                    lag: 1,
                    into: Some("Passengers_diff".to_string()),
                }];
                config.decompose = Some(DecomposeConfig {
                    column: "Passengers".to_string(),
                    model: Model::Multiplicative,
                    period: None,
                    adf_max_lag: None,
                });
                config.forecast = Some(ForecastConfig {
                    column: "Passengers".to_string(),
                    order: Order { p: 1, d: 1, q: 1 },
                    horizon: 12,
                });
            }
            Dataset::Cars => {
                config.cleaning.drop_duplicates = true;
                config.cleaning.case = vec![CaseRule {
                    column: "Color".to_string(),
                    case: Case::Lower,
                }];
                config.cleaning.missing = vec![
                    policy(
                        "Car",
                        FillPolicy::FillConstant {
                            value: Scalar::Text("Unknown".to_string()),
                        },
                    ),
                    policy("Price", FillPolicy::FillMean),
                    policy(
                        "Mileage",
                        FillPolicy::Interpolate {
                            edge: EdgePolicy::Nearest,
                        },
                    ),
                    policy("Color", FillPolicy::ForwardFill),
                ];
            }
        }
        config
    }

    fn validate(&self) -> Result<()> {
        if self.source.file.as_os_str().is_empty() {
            bail!("source file must not be empty");
        }
        if !self.source.options.delimiter.is_ascii() {
            bail!("delimiter must be an ASCII character");
        }

        if let Some(outliers) = &self.outliers {
            if outliers.columns.is_empty() {
                bail!("outlier columns must not be empty");
            }
            check_num(outliers.threshold, 0.1..=100.0).context("invalid z-score threshold")?;
            check_num(outliers.ddof, 0..=1).context("invalid outlier ddof")?;
        }

        if let Some(split) = &self.split {
            check_num(split.test_fraction, 0.01..=0.99).context("invalid test fraction")?;
        }

        if let Some(kmeans) = &self.describe.kmeans {
            if kmeans.columns.is_empty() {
                bail!("kmeans columns must not be empty");
            }
            check_num(kmeans.k, 1..=100).context("invalid number of clusters")?;
            check_num(kmeans.n_init, 1..=100).context("invalid number of kmeans starts")?;
            check_num(kmeans.max_iter, 1..=10_000).context("invalid kmeans iteration limit")?;
        }

        if let Some(decompose) = &self.decompose {
            if let Some(period) = decompose.period {
                check_num(period, 2..=366).context("invalid seasonal period")?;
            }
            if let Some(max_lag) = decompose.adf_max_lag {
                check_num(max_lag, 0..=100).context("invalid stationarity lag")?;
            }
        }

        if let Some(forecast) = &self.forecast {
            check_num(forecast.order.p, 0..=10).context("invalid autoregressive order")?;
            check_num(forecast.order.d, 0..=2).context("invalid differencing order")?;
            check_num(forecast.order.q, 0..=10).context("invalid moving-average order")?;
            check_num(forecast.horizon, 1..=1_000).context("invalid forecast horizon")?;
        }

        Ok(())
    }
}

/// Header of the timestamp index in generated sample files.
pub const SAMPLE_INDEX: &str = "Month";

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        for dataset in [Dataset::Income, Dataset::Passengers, Dataset::Cars] {
            let config = Config::template(dataset, PathBuf::from("data.csv"));
            let path = dir.path().join("config.toml");
            config.to_file(&path).unwrap();
            assert_eq!(Config::from_file(&path).unwrap(), config);
        }
    }

    #[test]
    fn reads_hand_written_config() {
        let text = r#"
[source]
file = "data.csv"

[source.options]
index_column = "Month"
parse_dates = true

[[cleaning.missing]]
column = "Passengers"
policy = { kind = "fill_constant", value = 0 }

[outliers]
columns = ["Passengers"]
correction = "median"

[[transform]]
kind = "difference"
column = "Passengers"

[split]
test_fraction = 0.25

[[describe.ttests]]
kind = "paired"
x = "Passengers"
y = "Passengers_diff"

[[describe.anova]]
kind = "columns"
columns = ["Passengers", "Passengers_diff"]

[describe.kmeans]
columns = ["Passengers"]
k = 2

[forecast]
column = "Passengers"
order = { p = 0, d = 1, q = 0 }
horizon = 3
"#;
        let config: Config = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.outliers.as_ref().unwrap().threshold, 3.0);
        assert_eq!(
            config.cleaning.missing[0].policy,
            FillPolicy::FillConstant {
                value: Scalar::Number(0.0)
            }
        );
        assert_eq!(config.source.options.delimiter, ',');
        assert_eq!(
            config.transform,
            vec![Step::Difference {
                column: "Passengers".to_string(),
                lag: 1,
                into: None
            }]
        );
        assert_eq!(config.split.as_ref().map(|split| split.seed), Some(0));
        assert_eq!(config.describe.ttests.len(), 1);
        assert_eq!(config.describe.anova.len(), 1);
        let kmeans = config.describe.kmeans.as_ref().unwrap().kmeans();
        assert_eq!((kmeans.k, kmeans.n_init, kmeans.max_iter), (2, 10, 300));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = Config::template(Dataset::Passengers, PathBuf::from("data.csv"));
        if let Some(forecast) = config.forecast.as_mut() {
            forecast.horizon = 0;
        }
        assert!(config.validate().is_err());

        let mut config = Config::template(Dataset::Income, PathBuf::from("data.csv"));
        if let Some(split) = config.split.as_mut() {
            split.test_fraction = 1.0;
        }
        assert!(config.validate().is_err());

        let mut config = Config::template(Dataset::Income, PathBuf::from("data.csv"));
        if let Some(kmeans) = config.describe.kmeans.as_mut() {
            kmeans.k = 0;
        }
        assert!(config.validate().is_err());

        let text = "[source]\nfile = \"data.csv\"\nunknown = 1\n";
        assert!(toml::from_str::<Config>(text).is_err());
    }
}
