use chrono::{Datelike, Local};
use clap::Args;

use kpi_pulse::error::AppError;
use kpi_pulse::{
    ActionRef, ActionStatus, AutomationOutcome, KpiSubmission, Period, ProcessOptions,
    RawMetrics, SkipReason, UserId,
};

use crate::infra::{build_service, parse_period};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reporting period (YYYY-MM). Defaults to the current month.
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: Option<Period>,
    /// Dispatch demo emails through the in-memory transport.
    #[arg(long)]
    pub(crate) send_email: bool,
    /// Print each employee's lifecycle timeline after processing.
    #[arg(long)]
    pub(crate) show_timeline: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        period,
        send_email,
        show_timeline,
    } = args;

    let period = period.unwrap_or_else(|| {
        let today = Local::now().date_naive();
        Period::new(today.year(), today.month()).unwrap_or(Period { year: 2025, month: 1 })
    });

    println!("KPI trigger automation demo ({period})");

    let (service, stores) = build_service(15);
    let options = ProcessOptions {
        send_email,
        reprocess: false,
    };

    let scenarios = [
        (
            "emp-strong",
            "a clean month",
            RawMetrics {
                tat: 95.0,
                quality: 95.0,
                app_usage: 98.0,
                neighbor_check: 90.0,
                general_negativity: 5.0,
                major_negativity: 0,
                insufficiency: 0,
            },
        ),
        (
            "emp-struggling",
            "a rough month",
            RawMetrics {
                tat: 60.0,
                quality: 70.0,
                app_usage: 80.0,
                neighbor_check: 65.0,
                general_negativity: 35.0,
                major_negativity: 5,
                insufficiency: 3,
            },
        ),
    ];

    for (user, blurb, metrics) in scenarios {
        println!("\n{user} ({blurb})");

        let components = match service.preview_components(&metrics) {
            Ok(components) => components,
            Err(err) => {
                println!("  Scoring unavailable: {err}");
                continue;
            }
        };
        println!("  Score components:");
        for component in &components {
            println!(
                "    - {}: raw {:.1} -> normalized {:.1} x weight {:.2} = {:.2}",
                component.metric.label(),
                component.raw,
                component.normalized,
                component.weight,
                component.contribution
            );
        }

        let record = match service.submit(KpiSubmission {
            user: UserId(user.to_string()),
            period,
            metrics,
        }) {
            Ok(record) => record,
            Err(err) => {
                println!("  Submission rejected: {err}");
                continue;
            }
        };
        println!(
            "  Recorded {} -> score {:.2} ({})",
            record.id.0,
            record.overall_score,
            record.rating.label()
        );

        match service.process_trigger(&record.id, options) {
            Ok(AutomationOutcome::Dispatched(result)) => {
                println!("  Automation {}:", result.overall.label());
                if result.actions.is_empty() {
                    println!("    - no actions owed");
                }
                for action in &result.actions {
                    println!("    - {} -> {}", action_label(&action.action), status_label(&action.status));
                }
            }
            Ok(other) => println!("  Automation skipped: {other:?}"),
            Err(err) => println!("  Automation unavailable: {err}"),
        }

        if show_timeline {
            match service.timeline(&UserId(user.to_string())) {
                Ok(events) => {
                    println!("  Timeline:");
                    for event in events {
                        println!("    - {}: {}", event.title, event.description);
                    }
                }
                Err(err) => println!("  Timeline unavailable: {err}"),
            }
        }
    }

    let emails = stores.email_log.all();
    if emails.is_empty() {
        println!("\nEmails: none dispatched (pass --send-email to exercise the transport)");
    } else {
        println!("\nEmail log:");
        for log in emails {
            println!(
                "  - {} -> {} attempt {} ({})",
                log.template.label(),
                log.user.0,
                log.attempt,
                match log.error {
                    Some(error) => error,
                    None => "sent".to_string(),
                }
            );
        }
    }

    Ok(())
}

fn action_label(action: &ActionRef) -> String {
    match action {
        ActionRef::Training(training) => format!("training/{}", training.label()),
        ActionRef::Audit(audit) => format!("audit/{}", audit.label()),
        ActionRef::Email(template) => format!("email/{}", template.label()),
        ActionRef::Notification(kind) => format!("notification/{}", kind.label()),
    }
}

fn status_label(status: &ActionStatus) -> String {
    match status {
        ActionStatus::Created => "created".to_string(),
        ActionStatus::Skipped(SkipReason::OpenDuplicate) => "skipped (open duplicate)".to_string(),
        ActionStatus::Skipped(SkipReason::AlreadyNotified) => {
            "skipped (already notified)".to_string()
        }
        ActionStatus::Skipped(SkipReason::AlreadySent) => "skipped (already sent)".to_string(),
        ActionStatus::Failed(error) => format!("failed: {error}"),
    }
}
