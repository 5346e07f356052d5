//! Behavioural coverage for the remote command sequence policy.

use gantry::test_support::ScriptedSession;
use gantry::{PlannedCommand, Reporter, run_sequence};

fn five_step_plan(third: PlannedCommand) -> Vec<PlannedCommand> {
    vec![
        PlannedCommand::halting("unpack", "unzip -o package.zip"),
        PlannedCommand::halting("clean up", "rm package.zip"),
        third,
        PlannedCommand::halting("install", "npm install --production"),
        PlannedCommand::halting("start", "pm2 start server.js"),
    ]
}

#[tokio::test]
async fn third_of_five_failing_halting_steps_skips_the_last_two() {
    let session = ScriptedSession::new();
    session.push_success();
    session.push_success();
    session.push_failure(2);

    let plan = five_step_plan(PlannedCommand::halting("migrate", "npm run migrate"));
    let mut reporter = Reporter::new(Vec::new());
    let report = run_sequence(&session, &plan, &mut reporter)
        .await
        .expect("sequence should run");

    assert_eq!(report.halted_at, Some(2));
    assert_eq!(report.steps.len(), 3, "only the first three steps ran");
    assert_eq!(
        session.commands(),
        vec![
            "unzip -o package.zip",
            "rm package.zip",
            "npm run migrate"
        ]
    );
}

#[tokio::test]
async fn third_step_marked_tolerated_lets_the_sequence_finish() {
    let session = ScriptedSession::new();
    session.push_success();
    session.push_success();
    session.push_failure(2);
    session.push_success();
    session.push_success();

    let plan = five_step_plan(PlannedCommand::tolerated("migrate", "npm run migrate"));
    let mut reporter = Reporter::new(Vec::new());
    let report = run_sequence(&session, &plan, &mut reporter)
        .await
        .expect("sequence should run");

    assert!(report.completed());
    assert_eq!(report.steps.len(), 5);
    assert_eq!(session.commands().len(), 5);
}

#[tokio::test]
async fn warnings_are_reported_for_tolerated_failures() {
    let session = ScriptedSession::new();
    session.push_failure(1);

    let plan = vec![PlannedCommand::tolerated("stop old process", "pm2 delete app")];
    let mut buffer = Vec::new();
    let mut reporter = Reporter::new(&mut buffer);
    run_sequence(&session, &plan, &mut reporter)
        .await
        .expect("sequence should run");

    let rendered = String::from_utf8(buffer).expect("reporter output should be UTF-8");
    assert!(
        rendered.contains("warning: 'stop old process' failed; continuing"),
        "got: {rendered}"
    );
}
