// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure report rendering over a [`TestRun`] / [`TestSuiteRun`] (spec
//! §2: "Report generator — pure function over TestRun -> human/JSON
//! report"). No I/O: callers decide where the rendered text or JSON
//! value goes.

use crate::run::TestRun;
use crate::suite::TestSuiteRun;
use std::fmt::Write as _;

pub fn render_text(run: &TestRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "test run {} ({})", run.id, run.route_name);
    let _ = writeln!(out, "status: {:?}", run.status);
    let _ = writeln!(
        out,
        "bots: {}/{} completed, {} passed, {} failed",
        run.bots_completed(),
        run.bots.len(),
        run.bots_passed(),
        run.bots_failed(),
    );
    if let Some(message) = &run.error_message {
        let _ = writeln!(out, "error: {message}");
    }
    for bot in &run.bots {
        let outcome = if !bot.complete {
            "incomplete"
        } else if bot.success {
            "PASS"
        } else {
            "FAIL"
        };
        let _ = writeln!(
            out,
            "  [{outcome}] {} ({})",
            bot.bot_name,
            bot.character_name.as_deref().unwrap_or("<no character>"),
        );
        for task in &bot.task_results {
            let _ = writeln!(
                out,
                "    {:?} {} ({:?})",
                task.result, task.task_name, task.duration
            );
            if let Some(message) = &task.error_message {
                let _ = writeln!(out, "      {message}");
            }
        }
    }
    out
}

pub fn render_json(run: &TestRun) -> serde_json::Value {
    serde_json::to_value(run).unwrap_or(serde_json::Value::Null)
}

pub fn render_suite_text(run: &TestSuiteRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "suite run {} ({})", run.id, run.name);
    let _ = writeln!(out, "status: {:?}", run.status);
    let _ = writeln!(
        out,
        "tests: {} passed, {} failed, {} skipped, {} total",
        run.tests_passed, run.tests_failed, run.tests_skipped, run.total_tests,
    );
    for test_run in &run.test_runs {
        let _ = write!(out, "{}", render_text(test_run));
    }
    out
}

pub fn render_suite_json(run: &TestSuiteRun) -> serde_json::Value {
    serde_json::to_value(run).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::HarnessSettings;
    use crate::run::{BotResult, RunStatus};

    fn sample_run() -> TestRun {
        let harness = HarnessSettings {
            bot_count: 1,
            account_prefix: "a_".to_string(),
            classes: vec!["Warrior".to_string()],
            race: "Human".to_string(),
            level: 1,
            items: Vec::new(),
            completed_quests: Vec::new(),
            start_position: None,
            setup_timeout_seconds: 30,
            test_timeout_seconds: 30,
            restore_snapshot: None,
            save_snapshot: None,
            equipment_sets: Vec::new(),
            class_equipment_sets: Default::default(),
        };
        let mut run = TestRun::new("t1".to_string(), harness);
        let mut bot = BotResult::new("a_1".to_string(), "Warrior".to_string());
        bot.complete = true;
        bot.success = true;
        run.bots.push(bot);
        run.set_status(RunStatus::Completed);
        run
    }

    #[test]
    fn text_report_mentions_route_and_status() {
        let text = render_text(&sample_run());
        assert!(text.contains("t1"));
        assert!(text.contains("Completed"));
        assert!(text.contains("PASS"));
    }

    #[test]
    fn json_report_round_trips_bot_count() {
        let value = render_json(&sample_run());
        assert_eq!(value["bots"].as_array().unwrap().len(), 1);
    }
}
