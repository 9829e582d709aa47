use crate::infra::{parse_policy, LogPushTransport, PushChannel, Services};
use chrono::{Duration, Utc};
use clap::Args;
use fieldwork::config::NotificationSettings;
use fieldwork::error::AppError;
use fieldwork::workflows::escalation::{
    CadenceSettings, CadenceSlots, CadenceVariant, SurchargeState, Task, TaskId,
};
use fieldwork::workflows::grading::{
    Contractor, ContractorId, ContractorRepository, EvaluationRecord, GradeClassifier,
    GradePolicy, GradingError, JobCompletion, PolicyKind, RecomputeOutcome,
};
use fieldwork::workflows::import::{EvaluationCsvImporter, GradeReport};
use fieldwork::workflows::notifications::{DeviceToken, RecipientId, RetryPolicy};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct GradeArgs {
    /// CSV export of customer evaluations
    pub(crate) evaluations: PathBuf,
    /// Optional CSV export of completed jobs
    #[arg(long)]
    pub(crate) completions: Option<PathBuf>,
    /// Grading policy: threshold or weighted
    #[arg(long, value_parser = parse_policy, default_value = "threshold")]
    pub(crate) policy: PolicyKind,
    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Grading policy: threshold or weighted
    #[arg(long, value_parser = parse_policy, default_value = "threshold")]
    pub(crate) policy: PolicyKind,
    /// Simulated hours of escalation for the sample urgent job
    #[arg(long, default_value_t = 8)]
    pub(crate) hours: i64,
}

pub(crate) fn run_grade_report(args: GradeArgs) -> Result<(), AppError> {
    let GradeArgs {
        evaluations,
        completions,
        policy,
        json,
    } = args;

    let evidence = EvaluationCsvImporter::from_path(evaluations, completions)?;
    let classifier = GradeClassifier::new(GradePolicy::standard(policy));
    let report = GradeReport::build(&evidence, &classifier);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Report unavailable: {err}"),
        }
        return Ok(());
    }

    println!(
        "Grade report ({} policy, {} contractors)",
        report.policy.label(),
        report.contractors.len()
    );
    for summary in &report.contractors {
        println!(
            "- {}: {} (score {:.2}) | {} evaluations | {} jobs | {:.0}% on time | {:.0} min response",
            summary.contractor_id,
            summary.tier,
            summary.score,
            summary.evaluations,
            summary.metrics.completed_jobs,
            summary.metrics.on_time_rate_percent,
            summary.metrics.response_time_minutes
        );
        for note in summary.notes.iter().take(3) {
            println!("    {note}");
        }
    }
    println!("Distribution:");
    for (tier, count) in report.distribution() {
        println!("  - {tier}: {count}");
    }

    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let settings = NotificationSettings {
        retry: RetryPolicy::default(),
        push_gateway_url: None,
    };
    let services = Services::build(
        GradePolicy::standard(args.policy),
        PushChannel::Log(LogPushTransport),
        &settings,
    );

    println!("Fieldwork demo ({} policy)", args.policy.label());
    if let Err(err) = grading_walkthrough(&services).await {
        println!("  Grading walkthrough stopped: {err}");
    }
    escalation_walkthrough(&services, args.hours.max(1)).await;

    Ok(())
}

async fn grading_walkthrough(services: &Services) -> Result<(), GradingError> {
    let now = Utc::now();
    let id = ContractorId("crew-harbor".to_string());
    let mut contractor = Contractor::new(id.clone(), "Harbor Install Crew", now);
    contractor.notification_targets = vec![DeviceToken("demo-device-harbor".to_string())];
    services.grading.register(contractor)?;

    println!("\nContractor grading");
    for index in 0..60 {
        services.store.append_completion(JobCompletion {
            task_id: TaskId(format!("demo-job-{index}")),
            contractor_id: id.clone(),
            response_minutes: 18.0,
            completed_on_time: index >= 2,
            completed_at: now - Duration::days(index),
        })?;
    }

    let mut last = None;
    for index in 0..10 {
        let record = demo_evaluation(&id, format!("demo-eval-{index}"), 4.7, true);
        last = Some(services.grading.record_evaluation(record).await?);
    }
    if let Some(outcome) = &last {
        print_outcome("after 10 strong evaluations", outcome);
    }

    let poor = demo_evaluation(&id, "demo-eval-poor".to_string(), 1.0, false);
    let outcome = services.grading.record_evaluation(poor).await?;
    print_outcome("after one poor evaluation", &outcome);

    for change in services.grading.history(&id)? {
        println!(
            "  history: {} -> {} at {} (score {:.2})",
            change.from,
            change.to,
            change.at.format("%Y-%m-%d %H:%M"),
            change.score
        );
    }
    Ok(())
}

fn demo_evaluation(
    id: &ContractorId,
    evaluation_id: String,
    score: f64,
    recommend: bool,
) -> EvaluationRecord {
    EvaluationRecord {
        id: evaluation_id,
        contractor_id: id.clone(),
        category_scores: BTreeMap::from([
            ("quality".to_string(), score),
            ("communication".to_string(), score),
        ]),
        overall_score: Some(score),
        would_recommend: Some(recommend),
        created_at: Utc::now(),
    }
}

fn print_outcome(label: &str, outcome: &RecomputeOutcome) {
    println!(
        "- {label}: {} -> {} ({:?}) | rating {:.2} | {} jobs | {:.0}% on time",
        outcome.previous_tier,
        outcome.tier,
        outcome.status,
        outcome.metrics.average_rating,
        outcome.metrics.completed_jobs,
        outcome.metrics.on_time_rate_percent
    );
    if let Some(status) = outcome.notification {
        println!("  push: {status:?}");
    }
}

async fn escalation_walkthrough(services: &Services, hours: i64) {
    let posted = Utc::now() - Duration::hours(hours);
    let customer = RecipientId("customer-demo".to_string());
    if let Err(err) = services.store.register_devices(
        customer.clone(),
        vec![DeviceToken("demo-device-customer".to_string())],
    ) {
        println!("  Device registration failed: {err}");
        return;
    }

    let cadence = CadenceSettings::new(std::time::Duration::from_secs(3600), 5);
    let task = Task::open(
        TaskId("urgent-demo-1".to_string()),
        "Emergency boiler replacement",
        SurchargeState::new(15, 50),
        CadenceSlots::long(cadence),
        posted,
    )
    .with_watchers(vec![customer]);

    println!("\nUrgent fee escalation");
    if let Err(err) = services.tasks.create(task) {
        println!("  Task creation failed: {err}");
        return;
    }

    for hour in 1..=hours {
        let at = posted + Duration::hours(hour);
        match services.scheduler.tick(CadenceVariant::Long, at).await {
            Ok(report) => {
                for escalated in &report.escalated {
                    println!(
                        "- hour {hour}: {}% -> {}%{}",
                        escalated.previous_rate,
                        escalated.new_rate,
                        if escalated.capped { " (capped)" } else { "" }
                    );
                }
                if report.escalated.is_empty() {
                    println!("- hour {hour}: no change");
                }
            }
            Err(err) => {
                println!("  Tick failed: {err}");
                return;
            }
        }
    }

    let id = TaskId("urgent-demo-1".to_string());
    match services
        .tasks
        .claim(&id, ContractorId("crew-harbor".to_string()))
    {
        Ok(task) => {
            let view = task.view();
            println!(
                "- claimed by crew-harbor at {}% ({:?})",
                view.current_rate, view.escalation
            );
            match serde_json::to_string_pretty(&view) {
                Ok(json) => println!("  Task payload:\n{json}"),
                Err(err) => println!("  Task payload unavailable: {err}"),
            }
        }
        Err(err) => println!("  Claim failed: {err}"),
    }
}
