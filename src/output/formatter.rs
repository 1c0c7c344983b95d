//! Output formatters for suite results
//!
//! Provides table, JSON, CSV and summary output formats.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::models::{ExecutionStatistics, TestResult, TestStatus, TestSuite};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Results of one suite run, ordered by start time
#[derive(Debug, Serialize)]
pub struct SuiteReport<'a> {
    pub suite_id: &'a str,
    pub statistics: &'a ExecutionStatistics,
    pub results: Vec<&'a TestResult>,
}

impl<'a> SuiteReport<'a> {
    pub fn new(
        suite_id: &'a str,
        results: &'a HashMap<String, TestResult>,
        statistics: &'a ExecutionStatistics,
    ) -> Self {
        let mut ordered: Vec<&TestResult> = results.values().collect();
        ordered.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.test_id.cmp(&b.test_id))
        });
        Self {
            suite_id,
            statistics,
            results: ordered,
        }
    }
}

/// One CSV row per test result
#[derive(Serialize)]
struct CsvRow<'a> {
    test_id: &'a str,
    test_name: &'a str,
    category: &'a str,
    status: TestStatus,
    success: bool,
    attempts: u32,
    duration_ms: u64,
    start_time: String,
    error: &'a str,
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn status_label(&self, status: TestStatus) -> String {
        let label = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return label;
        }
        let color = match status {
            TestStatus::Completed => "32",
            TestStatus::Failed => "31",
            TestStatus::Stopped => "35",
            TestStatus::Skipped => "33",
            TestStatus::Pending | TestStatus::Running => "36",
        };
        format!("\x1b[{color}m{label}\x1b[0m")
    }

    /// Format a single test result
    pub fn format_result(&self, result: &TestResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Summary => format!(
                "{} {} ({}ms)",
                result.status.symbol(),
                result.test_name,
                result.duration_ms
            ),
            OutputFormat::Table | OutputFormat::Csv => self.format_result_row(result),
        }
    }

    fn format_result_row(&self, result: &TestResult) -> String {
        format!(
            "{:28} {:14} {:<13} {:>2}x [{:>7}ms]",
            truncate(&result.test_id, 28),
            truncate(&result.category, 14),
            self.status_label(result.status),
            result.attempts,
            result.duration_ms
        )
    }

    /// Format the results and statistics of a suite run
    pub fn format_report(&self, report: &SuiteReport<'_>) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_report_table(report)),
            OutputFormat::Json => {
                serde_json::to_string(report).context("Failed to serialize report")
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(report).context("Failed to serialize report")
            }
            OutputFormat::Csv => format_report_csv(report),
            OutputFormat::Summary => Ok(format_statistics_brief(report.suite_id, report.statistics)),
        }
    }

    fn format_report_table(&self, report: &SuiteReport<'_>) -> String {
        let mut output = String::new();
        let stats = report.statistics;

        output.push_str("\n╔══════════════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Suite: {:60} ║\n", truncate(report.suite_id, 60)));
        output.push_str("╠══════════════════════════════════════════════════════════════════════╣\n");

        for result in &report.results {
            output.push_str(&format!("  {}\n", self.format_result_row(result)));
            if let Some(err) = &result.error {
                output.push_str(&format!("      └─ {err}\n"));
            }
        }

        output.push_str("╠══════════════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", stats.passed_tests)
        } else {
            stats.passed_tests.to_string()
        };
        let fail_str = if self.colorize && stats.failed_tests > 0 {
            format!("\x1b[31m{}\x1b[0m", stats.failed_tests)
        } else {
            stats.failed_tests.to_string()
        };

        output.push_str(&format!(
            "  Total: {} | Completed: {} | Pass: {} | Fail: {} | Skip: {}\n",
            stats.total_tests, stats.completed_tests, pass_str, fail_str, stats.skipped_tests
        ));
        output.push_str(&format!(
            "  Success Rate: {:5.1}% | Duration: {}ms | Average: {:.1}ms\n",
            stats.success_rate * 100.0,
            stats.total_duration_ms,
            stats.average_duration_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════════════╝\n");

        output
    }

    /// Format the tests of a suite without running them
    pub fn format_test_list(&self, suite: &TestSuite) -> String {
        let mut output = String::new();
        output.push_str(&format!("{} ({} tests)\n", suite.name, suite.tests.len()));

        for test in &suite.tests {
            output.push_str(&format!(
                "  {:28} {:14} {}\n",
                truncate(&test.id, 28),
                test.category,
                test.description
            ));
            if !test.dependencies.is_empty() {
                output.push_str(&format!(
                    "  {:28} {:14} after: {}\n",
                    "",
                    "",
                    test.dependencies.join(", ")
                ));
            }
        }

        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn format_report_csv(report: &SuiteReport<'_>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for result in &report.results {
        writer
            .serialize(CsvRow {
                test_id: &result.test_id,
                test_name: &result.test_name,
                category: &result.category,
                status: result.status,
                success: result.success,
                attempts: result.attempts,
                duration_ms: result.duration_ms,
                start_time: result.start_time.to_rfc3339(),
                error: result.error.as_deref().unwrap_or(""),
            })
            .context("Failed to write CSV row")?;
    }

    let bytes = writer.into_inner().context("Failed to flush CSV output")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

fn format_statistics_brief(suite_id: &str, stats: &ExecutionStatistics) -> String {
    format!(
        "Suite {}: {}/{} passed, {} failed, {} skipped ({:.1}%) in {}ms",
        suite_id,
        stats.passed_tests,
        stats.total_tests,
        stats.failed_tests,
        stats.skipped_tests,
        stats.success_rate * 100.0,
        stats.total_duration_ms
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Write a suite report to a file
pub fn write_report_to_file(
    path: impl AsRef<Path>,
    report: &SuiteReport<'_>,
    format: OutputFormat,
) -> Result<()> {
    let path = path.as_ref();
    let content = ResultFormatter::new(format).no_color().format_report(report)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
