//! Bulk KPI intake from CSV exports.
//!
//! Rows are submitted and processed one at a time; a malformed or rejected
//! row is reported against its line number and never aborts the rest of
//! the batch.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::domain::{KpiScoreId, Period, RawMetrics, UserId};
use super::orchestrator::{AutomationOutcome, ProcessOptions};
use super::service::{KpiService, KpiSubmission};

#[derive(Debug, Deserialize)]
struct BulkRow {
    user_id: String,
    period: String,
    tat: f64,
    quality: f64,
    app_usage: f64,
    neighbor_check: f64,
    general_negativity: f64,
    major_negativity: u32,
    insufficiency: u32,
}

impl BulkRow {
    fn into_submission(self) -> Result<KpiSubmission, String> {
        let period = Period::parse(&self.period).map_err(|err| err.to_string())?;
        Ok(KpiSubmission {
            user: UserId(self.user_id),
            period,
            metrics: RawMetrics {
                tat: self.tat,
                quality: self.quality,
                app_usage: self.app_usage,
                neighbor_check: self.neighbor_check,
                general_negativity: self.general_negativity,
                major_negativity: self.major_negativity,
                insufficiency: self.insufficiency,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRowResult {
    pub line: usize,
    pub kpi_score: KpiScoreId,
    pub automation: AutomationOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRowFailure {
    pub line: usize,
    pub error: String,
}

/// Per-batch outcome report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub submitted: Vec<BulkRowResult>,
    pub failures: Vec<BulkRowFailure>,
}

/// Submit and process every row of a CSV export.
pub fn import_csv<R: Read>(
    service: &KpiService,
    reader: R,
    options: ProcessOptions,
) -> BulkReport {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut report = BulkReport::default();

    for (index, row) in csv_reader.deserialize::<BulkRow>().enumerate() {
        // Header occupies line 1.
        let line = index + 2;

        let submission = match row.map_err(|err| err.to_string()).and_then(BulkRow::into_submission)
        {
            Ok(submission) => submission,
            Err(error) => {
                report.failures.push(BulkRowFailure { line, error });
                continue;
            }
        };

        match service.submit(submission) {
            Ok(record) => match service.process_trigger(&record.id, options) {
                Ok(automation) => report.submitted.push(BulkRowResult {
                    line,
                    kpi_score: record.id,
                    automation,
                }),
                Err(err) => report.failures.push(BulkRowFailure {
                    line,
                    error: err.to_string(),
                }),
            },
            Err(err) => report.failures.push(BulkRowFailure {
                line,
                error: err.to_string(),
            }),
        }
    }

    report
}
