use std::collections::HashSet;
use std::sync::Arc;

use cartwise_core::config::{AppConfig, LoadOptions};
use cartwise_core::discounts::default_discount_trees;
use cartwise_core::fixtures;
use cartwise_core::session::{spawn_timeout_sweeper, SessionManager};
use cartwise_core::{DiscountRule, SessionState, UserProfile};
use chrono::{Duration, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = vec![check_discount_catalog(), check_starter_rules(), check_seed_catalog()];

    match AppConfig::load(LoadOptions::default()) {
        Ok(_) => {
            checks.insert(
                0,
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Pass,
                    details: "configuration loaded and validated".to_string(),
                },
            );
            checks.push(check_session_sweeper());
        }
        Err(error) => {
            checks.insert(
                0,
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                },
            );
            checks.push(DoctorCheck {
                name: "session_sweeper",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_discount_catalog() -> DoctorCheck {
    let trees = default_discount_trees();
    let names: Vec<&str> = trees.iter().map(|tree| tree.name()).collect();
    let status = if trees.is_empty() { CheckStatus::Fail } else { CheckStatus::Pass };
    DoctorCheck {
        name: "discount_catalog",
        status,
        details: format!("{} discount trees: {}", trees.len(), names.join(", ")),
    }
}

fn check_starter_rules() -> DoctorCheck {
    let failures: Vec<String> = fixtures::starter_rules()
        .iter()
        .filter_map(|rule| {
            let condition = rule.condition.as_ref()?;
            condition.resolve().err().map(|error| format!("{}: {error}", rule.id))
        })
        .collect();

    if failures.is_empty() {
        DoctorCheck {
            name: "starter_rules",
            status: CheckStatus::Pass,
            details: "every starter rule condition parses".to_string(),
        }
    } else {
        DoctorCheck { name: "starter_rules", status: CheckStatus::Fail, details: failures.join("; ") }
    }
}

fn check_seed_catalog() -> DoctorCheck {
    let catalog = fixtures::seed_catalog();
    let mut seen = HashSet::new();
    let duplicates: Vec<String> = catalog
        .iter()
        .filter(|product| !seen.insert(product.id.clone()))
        .map(|product| product.id.to_string())
        .collect();

    if catalog.is_empty() {
        return DoctorCheck {
            name: "seed_catalog",
            status: CheckStatus::Fail,
            details: "seed catalog is empty".to_string(),
        };
    }
    if !duplicates.is_empty() {
        return DoctorCheck {
            name: "seed_catalog",
            status: CheckStatus::Fail,
            details: format!("duplicate product ids: {}", duplicates.join(", ")),
        };
    }
    DoctorCheck {
        name: "seed_catalog",
        status: CheckStatus::Pass,
        details: format!("{} products with unique ids", catalog.len()),
    }
}

/// Starts the timeout sweeper against a session that is already stale and
/// waits for it to be abandoned.
fn check_session_sweeper() -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "session_sweeper",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let abandoned = runtime.block_on(async {
        let manager = Arc::new(SessionManager::new(Duration::minutes(1)));
        let stale = Utc::now() - Duration::minutes(5);
        let session_id = manager.create(UserProfile::new("doctor", "Doctor"), stale);

        let sweeper =
            spawn_timeout_sweeper(Arc::clone(&manager), std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        sweeper.abort();

        manager.with_session(&session_id, |session| session.state())
    });

    match abandoned {
        Some(SessionState::Abandoned) => DoctorCheck {
            name: "session_sweeper",
            status: CheckStatus::Pass,
            details: "idle sessions are abandoned by the sweeper".to_string(),
        },
        other => DoctorCheck {
            name: "session_sweeper",
            status: CheckStatus::Fail,
            details: format!("stale session was not abandoned (state: {other:?})"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
