use super::common::harness;
use crate::engine::bulk::import_csv;
use crate::engine::orchestrator::{AutomationOutcome, ProcessOptions};

const HEADER: &str =
    "user_id,period,tat,quality,app_usage,neighbor_check,general_negativity,major_negativity,insufficiency";

#[test]
fn import_submits_and_processes_every_valid_row() {
    let h = harness();
    let csv = format!(
        "{HEADER}\n\
         emp-60,2025-06,95,95,98,90,5,0,0\n\
         emp-61,2025-06,60,70,80,65,35,5,3\n"
    );

    let report = import_csv(
        &h.service,
        csv.as_bytes(),
        ProcessOptions {
            send_email: false,
            reprocess: false,
        },
    );

    assert_eq!(report.submitted.len(), 2);
    assert!(report.failures.is_empty());
    assert!(report
        .submitted
        .iter()
        .all(|row| matches!(row.automation, AutomationOutcome::Dispatched(_))));

    // Only the weak row owes trainings.
    assert_eq!(h.stores.training.all().len(), 3);
}

#[test]
fn bad_rows_are_reported_by_line_and_never_abort_the_batch() {
    let h = harness();
    let csv = format!(
        "{HEADER}\n\
         emp-62,2025-06,95,95,98,90,5,0,0\n\
         emp-63,June 2025,95,95,98,90,5,0,0\n\
         emp-64,2025-06,not-a-number,95,98,90,5,0,0\n\
         emp-62,2025-06,60,70,80,65,35,5,3\n\
         emp-65,2025-06,95,95,98,90,5,0,0\n"
    );

    let report = import_csv(
        &h.service,
        csv.as_bytes(),
        ProcessOptions {
            send_email: false,
            reprocess: false,
        },
    );

    assert_eq!(report.submitted.len(), 2);
    assert_eq!(report.failures.len(), 3);

    let failed_lines: Vec<_> = report.failures.iter().map(|f| f.line).collect();
    // Line 3: unparseable period. Line 4: unparseable rate. Line 5: duplicate period.
    assert_eq!(failed_lines, vec![3, 4, 5]);
    assert!(report.failures[2].error.contains("already exists"));
}

#[test]
fn empty_file_yields_an_empty_report() {
    let h = harness();
    let report = import_csv(&h.service, HEADER.as_bytes(), ProcessOptions::default());
    assert!(report.submitted.is_empty());
    assert!(report.failures.is_empty());
}
