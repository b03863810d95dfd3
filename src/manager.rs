use crate::config::{Config, KMeansConfig, SAMPLE_INDEX};
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tabstat::cluster::{self, KMeansFit};
use tabstat::decompose::{self, Decomposition};
use tabstat::forecast::{self, ArimaFit};
use tabstat::hypothesis::{AnovaOutcome, TTestOutcome};
use tabstat::missing;
use tabstat::outliers::{self, OutlierReport, ZScoreRule};
use tabstat::source;
use tabstat::stationarity::{self, AdfTest};
use tabstat::stats::{self, ColumnSummary};
use tabstat::synth::{self, Dataset};
use tabstat::table::{Column, Table};
use tabstat::transform;

/// Everything computed by one command, saved as MessagePack.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Report {
    pub cleaning: Option<CleaningReport>,
    pub summaries: Vec<ColumnSummary>,
    pub correlations: Vec<Correlation>,
    pub hypothesis_tests: Vec<TestReport<TTestOutcome>>,
    pub anova: Vec<TestReport<AnovaOutcome>>,
    pub clustering: Option<ClusterReport>,
    pub decomposition: Option<Decomposition>,
    pub stationarity: Option<StationarityReport>,
    pub forecast: Option<ForecastReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleaningReport {
    pub n_rows_read: usize,
    pub n_rows_kept: usize,
    pub duplicates_dropped: usize,
    pub missing_before: Vec<(String, usize)>,
    pub missing_after: Vec<(String, usize)>,
    pub outliers: Vec<OutlierReport>,
    pub split: Option<SplitReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SplitReport {
    pub n_train: usize,
    pub n_test: usize,
}

/// A configured test and its outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestReport<T> {
    pub test: String,
    pub outcome: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterReport {
    pub columns: Vec<String>,
    pub fit: KMeansFit,
    pub sizes: Vec<usize>,
}

/// Dickey-Fuller tests of a series and of its first difference.
#[derive(Debug, Serialize, Deserialize)]
pub struct StationarityReport {
    pub column: String,
    pub levels: AdfTest,
    pub first_difference: AdfTest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Correlation {
    pub x: String,
    pub y: String,
    pub pearson: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastReport {
    pub fit: ArimaFit,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

/// Stages of the pipeline a command runs after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clean,
    Describe,
    Decompose,
    Forecast,
    All,
}

pub struct Manager {
    work_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(work_dir: P) -> Result<Self> {
        let work_dir = work_dir.as_ref().to_path_buf();

        let cfg = Config::from_file(config_file(&work_dir)).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { work_dir, cfg })
    }

    /// Write a sample dataset and a matching config into `work_dir`.
    pub fn generate<P: AsRef<Path>>(work_dir: P, dataset: Dataset, seed: u64) -> Result<()> {
        let work_dir = work_dir.as_ref();
        fs::create_dir_all(work_dir).with_context(|| format!("failed to create {work_dir:?}"))?;

        let table = synth::generate(dataset, seed).context("failed to generate dataset")?;
        let data_file = work_dir.join(DATA_FILE);
        source::write_csv_labeled(&table, &data_file, SAMPLE_INDEX)
            .with_context(|| format!("failed to write {data_file:?}"))?;
        log::info!("wrote {} rows to {data_file:?}", table.n_rows());

        let cfg = Config::template(dataset, PathBuf::from(DATA_FILE));
        let cfg_file = config_file(work_dir);
        cfg.to_file(&cfg_file)?;
        log::info!("wrote {cfg_file:?}");

        Ok(())
    }

    pub fn run_stage(&self, stage: Stage) -> Result<()> {
        let mut report = Report::default();

        let table = self
            .prepare(&mut report)
            .context("failed to prepare table")?;
        if matches!(stage, Stage::Clean | Stage::All) {
            let file = self.work_dir.join(CLEANED_FILE);
            source::write_csv(&table, &file).with_context(|| format!("failed to write {file:?}"))?;
            log::info!("wrote {file:?}");
            self.split(&table, &mut report).context("failed to split table")?;
        }
        if matches!(stage, Stage::Describe | Stage::All) {
            self.describe(&table, &mut report)
                .context("failed to describe table")?;
        }
        if matches!(stage, Stage::Decompose | Stage::All) {
            self.decompose(&table, &mut report)
                .context("failed to decompose series")?;
        }
        if matches!(stage, Stage::Forecast | Stage::All) {
            self.forecast(&table, &mut report)
                .context("failed to forecast series")?;
        }

        self.save_report(&report).context("failed to save report")?;

        Ok(())
    }

    /// Remove every output file from the work directory.
    pub fn purge(&self) -> Result<()> {
        let pattern = self.work_dir.join("out-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for path in glob(pattern)
            .context("failed to glob output files")?
            .filter_map(Result::ok)
        {
            fs::remove_file(&path).with_context(|| format!("failed to remove {path:?}"))?;
            log::info!("removed {path:?}");
        }
        Ok(())
    }

    fn prepare(&self, report: &mut Report) -> Result<Table> {
        let file = self.work_dir.join(&self.cfg.source.file);
        let mut table = source::read_csv(&file, &self.cfg.source.options)
            .with_context(|| format!("failed to read {file:?}"))?;
        let n_rows_read = table.n_rows();
        let missing_before = table.missing_counts();
        log::info!(
            "read {n_rows_read} rows and {} columns from {file:?}",
            table.n_columns()
        );

        let cleaning = &self.cfg.cleaning;
        for name in &cleaning.drop_columns {
            table
                .drop_column(name)
                .with_context(|| format!("failed to drop column {name:?}"))?;
        }
        let mut duplicates_dropped = 0;
        if cleaning.drop_duplicates {
            (table, duplicates_dropped) = table.drop_duplicates();
            log::info!("dropped {duplicates_dropped} duplicate rows");
        }
        for rule in &cleaning.case {
            table
                .normalize_case(&rule.column, rule.case)
                .with_context(|| format!("failed to normalize case of {:?}", rule.column))?;
        }
        missing::apply_in_place(&mut table, &cleaning.missing)
            .context("failed to handle missing values")?;

        let mut outlier_reports = Vec::new();
        if let Some(outlier_cfg) = &self.cfg.outliers {
            let rule = ZScoreRule {
                threshold: outlier_cfg.threshold,
                ddof: outlier_cfg.ddof,
            };
            let (corrected, reports) =
                outliers::correct(&table, &outlier_cfg.columns, &rule, outlier_cfg.correction)
                    .context("failed to correct outliers")?;
            for outlier_report in &reports {
                log::info!(
                    "flagged {} outliers in {:?}",
                    outlier_report.flagged.len(),
                    outlier_report.column
                );
            }
            table = corrected;
            outlier_reports = reports;
        }

        for step in &self.cfg.transform {
            table = step
                .apply(&table)
                .with_context(|| format!("failed to apply {step:?}"))?;
        }

        log::info!("kept {} of {n_rows_read} rows", table.n_rows());
        report.cleaning = Some(CleaningReport {
            n_rows_read,
            n_rows_kept: table.n_rows(),
            duplicates_dropped,
            missing_before,
            missing_after: table.missing_counts(),
            outliers: outlier_reports,
            split: None,
        });

        Ok(table)
    }

    fn describe(&self, table: &Table, report: &mut Report) -> Result<()> {
        report.summaries = stats::describe_table(table);
        for summary in &report.summaries {
            log::info!("{summary:?}");
        }

        for (x, y) in &self.cfg.describe.correlations {
            let pearson = stats::correlate(table, x, y)
                .with_context(|| format!("failed to correlate {x:?} and {y:?}"))?;
            log::info!("pearson({x:?}, {y:?}) = {pearson:.4}");
            report.correlations.push(Correlation {
                x: x.clone(),
                y: y.clone(),
                pearson,
            });
        }

        for ttest in &self.cfg.describe.ttests {
            let outcome = ttest
                .run(table)
                .with_context(|| format!("failed to run {ttest}"))?;
            log::info!(
                "{ttest}: t = {:.4}, p = {:.4}",
                outcome.statistic,
                outcome.p_value
            );
            report.hypothesis_tests.push(TestReport {
                test: ttest.to_string(),
                outcome,
            });
        }

        for anova in &self.cfg.describe.anova {
            let outcome = anova
                .run(table)
                .with_context(|| format!("failed to run {anova}"))?;
            log::info!(
                "{anova}: F = {:.4}, p = {:.4}",
                outcome.statistic,
                outcome.p_value
            );
            report.anova.push(TestReport {
                test: anova.to_string(),
                outcome,
            });
        }

        if let Some(cfg) = &self.cfg.describe.kmeans {
            self.cluster(table, cfg, report).context("failed to cluster rows")?;
        }

        Ok(())
    }

    fn cluster(&self, table: &Table, cfg: &KMeansConfig, report: &mut Report) -> Result<()> {
        let fit = cluster::cluster_columns(table, &cfg.columns, &cfg.kmeans())?;
        let sizes = fit.sizes();
        log::info!(
            "clustered {:?} into {sizes:?} (inertia = {:.4}, {} iterations)",
            cfg.columns,
            fit.inertia,
            fit.n_iter
        );
        if !fit.converged {
            log::warn!("kmeans did not converge within {} iterations", cfg.max_iter);
        }

        let mut columns = cfg
            .columns
            .iter()
            .map(|name| table.column(name).cloned())
            .collect::<tabstat::Result<Vec<_>>>()?;
        let labels = fit.labels.iter().map(|&label| Some(label as f64)).collect();
        columns.push(Column::numeric(CLUSTER_COLUMN, labels));
        let clusters = Table::new(table.index().clone(), columns)?;

        let file = self.work_dir.join(CLUSTERS_FILE);
        source::write_csv(&clusters, &file).with_context(|| format!("failed to write {file:?}"))?;
        log::info!("wrote {file:?}");

        report.clustering = Some(ClusterReport {
            columns: cfg.columns.clone(),
            fit,
            sizes,
        });
        Ok(())
    }

    fn split(&self, table: &Table, report: &mut Report) -> Result<()> {
        let Some(cfg) = &self.cfg.split else {
            return Ok(());
        };

        let (train, test) = transform::train_test_split(table, cfg.test_fraction, cfg.seed)?;
        for (part, file) in [(&train, TRAIN_FILE), (&test, TEST_FILE)] {
            let file = self.work_dir.join(file);
            source::write_csv(part, &file).with_context(|| format!("failed to write {file:?}"))?;
            log::info!("wrote {} rows to {file:?}", part.n_rows());
        }

        if let Some(cleaning) = report.cleaning.as_mut() {
            cleaning.split = Some(SplitReport {
                n_train: train.n_rows(),
                n_test: test.n_rows(),
            });
        }
        Ok(())
    }

    fn decompose(&self, table: &Table, report: &mut Report) -> Result<()> {
        let Some(cfg) = &self.cfg.decompose else {
            log::warn!("no decompose section in config");
            return Ok(());
        };

        let decomposition = decompose::decompose_column(table, &cfg.column, cfg.period, cfg.model)
            .with_context(|| format!("failed to decompose {:?}", cfg.column))?;
        log::info!(
            "decomposed {:?} ({} model, period {})",
            cfg.column,
            decomposition.model,
            decomposition.period
        );

        let file = self.work_dir.join(DECOMPOSITION_FILE);
        let components = decomposition.to_table(table.index().clone())?;
        source::write_csv(&components, &file).with_context(|| format!("failed to write {file:?}"))?;
        log::info!("wrote {file:?}");

        report.decomposition = Some(decomposition);

        let levels = stationarity::adf_column(table, &cfg.column, cfg.adf_max_lag)
            .with_context(|| format!("failed to test stationarity of {:?}", cfg.column))?;
        let vals = table.column(&cfg.column)?.complete_values()?;
        let diff = transform::difference(&vals, 1)?;
        let first_difference = stationarity::adf(&diff, cfg.adf_max_lag)
            .with_context(|| format!("failed to test stationarity of {:?} diff", cfg.column))?;
        for (label, test) in [("levels", &levels), ("first difference", &first_difference)] {
            log::info!(
                "adf({:?}, {label}) = {:.4} (p = {:.4}, lag {}, stationary: {})",
                cfg.column,
                test.statistic,
                test.p_value,
                test.used_lag,
                test.is_stationary()
            );
        }
        report.stationarity = Some(StationarityReport {
            column: cfg.column.clone(),
            levels,
            first_difference,
        });
        Ok(())
    }

    fn forecast(&self, table: &Table, report: &mut Report) -> Result<()> {
        let Some(cfg) = &self.cfg.forecast else {
            log::warn!("no forecast section in config");
            return Ok(());
        };

        let (fit, preds) = forecast::forecast_column(table, &cfg.column, cfg.order, cfg.horizon)
            .with_context(|| format!("failed to fit {} to {:?}", cfg.order, cfg.column))?;
        log::info!(
            "fitted {} to {:?} (sigma2 = {:.4})",
            cfg.order,
            cfg.column,
            fit.sigma2
        );

        let file = self.work_dir.join(FORECAST_FILE);
        source::write_csv(&preds, &file).with_context(|| format!("failed to write {file:?}"))?;
        log::info!("wrote {file:?}");

        let labels = (0..preds.n_rows()).map(|row| preds.index().label(row)).collect();
        let values = preds.column(&cfg.column)?.complete_values()?;
        report.forecast = Some(ForecastReport {
            fit,
            labels,
            values,
        });
        Ok(())
    }

    fn save_report(&self, report: &Report) -> Result<()> {
        let file = self.work_dir.join(REPORT_FILE);
        let handle = File::create(&file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(handle);

        encode::write_named(&mut writer, report).context("failed to serialize report")?;
        writer.flush().context("failed to flush writer stream")?;
        log::info!("wrote {file:?}");

        Ok(())
    }
}

const DATA_FILE: &str = "data.csv";
const CLEANED_FILE: &str = "out-cleaned.csv";
const DECOMPOSITION_FILE: &str = "out-decomposition.csv";
const FORECAST_FILE: &str = "out-forecast.csv";
const CLUSTERS_FILE: &str = "out-clusters.csv";
const TRAIN_FILE: &str = "out-train.csv";
const TEST_FILE: &str = "out-test.csv";
const REPORT_FILE: &str = "out-report.msgpack";

const CLUSTER_COLUMN: &str = "cluster";

fn config_file(work_dir: &Path) -> PathBuf {
    work_dir.join("config.toml")
}
