use stui::hub::{CommandState, HubConfig, HubContext, MsgCode, Scalar, Severity};
use stui::testdata::TestDispatcher;

#[test]
fn broadcast_replaces_previous_value() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "tcc");

    test.dispatch(&["AxePos=-340.009, 45, NaN"], None);
    let first = ctx.model().values("tcc", "AxePos").expect("AxePos present");
    assert_eq!(first.len(), 3);
    assert_eq!(first[0], Scalar::Float(-340.009));
    assert_eq!(first[1], Scalar::Int(45));
    assert!(first[2].as_f64().is_some_and(f64::is_nan));

    ctx.dispatcher().dispatch("tcc AxePos=-342.0, 38.0, NaN");
    let second = ctx.model().values("tcc", "AxePos").expect("AxePos present");
    assert_eq!(second.len(), 3);
    assert_eq!(second[0], Scalar::Float(-342.0));
    assert_eq!(second[1], Scalar::Float(38.0));
    assert!(second[2].as_f64().is_some_and(f64::is_nan));
}

#[test]
fn malformed_line_is_logged_and_dropped() {
    let ctx = HubContext::new(HubConfig::test());
    ctx.dispatcher().dispatch(".stui 0 tcc i Name=\"unterminated");
    ctx.dispatcher().dispatch("tcc SecFocus=570");

    assert!(ctx.model().get("tcc", "Name").is_none());
    assert_eq!(ctx.model().value("tcc", "SecFocus", 0), Some(Scalar::Int(570)));
    assert_eq!(ctx.log().entries_at_least(Severity::Warning).len(), 1);
}

#[tokio::test]
async fn failure_reply_resolves_failed() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "apogeecal");

    let mut invocation = ctx
        .dispatcher()
        .issue_command("apogeecal", "allOff")
        .expect("issue");
    test.reply(invocation.id(), "apogeecal", MsgCode::Info, &["text=\"working\""]);
    assert_eq!(invocation.state(), CommandState::Pending);

    test.reply(invocation.id(), "apogeecal", MsgCode::Failed, &["text=\"lamp stuck\""]);
    assert_eq!(invocation.wait().await, CommandState::Failed);
    assert_eq!(invocation.replies().len(), 2);
    assert_eq!(invocation.last_reply_text().as_deref(), Some("lamp stuck"));
    assert_eq!(ctx.dispatcher().pending_count(), 0);
}

#[tokio::test]
async fn command_resolves_exactly_once() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "tcc");

    let mut invocation = ctx.dispatcher().issue_command("tcc", "show").expect("issue");
    test.reply::<&str>(invocation.id(), "tcc", MsgCode::Done, &[]);
    test.reply::<&str>(invocation.id(), "tcc", MsgCode::Failed, &[]);
    ctx.dispatcher().cancel_all();

    assert_eq!(invocation.wait().await, CommandState::Done);
    assert_eq!(invocation.state(), CommandState::Done);
    assert_eq!(invocation.replies().len(), 1);
}

#[tokio::test]
async fn replies_from_another_commander_are_ignored() {
    let ctx = HubContext::new(HubConfig::test());
    let invocation = ctx.dispatcher().issue_command("tcc", "show").expect("issue");

    // The null connection has no commander of its own, so any commander matches.
    ctx.dispatcher()
        .dispatch(&format!("other.user {} tcc w Text=\"hi\"", invocation.id()));
    assert_eq!(invocation.replies().len(), 1);

    // Unsolicited broadcasts never touch pending commands.
    ctx.dispatcher().dispatch("tcc Text=\"broadcast\"");
    assert_eq!(invocation.replies().len(), 1);
    assert_eq!(invocation.state(), CommandState::Pending);
}

#[tokio::test]
async fn disconnect_cancels_pending_commands() {
    let ctx = HubContext::new(HubConfig::test());
    let mut first = ctx.dispatcher().issue_command("tcc", "show").expect("issue");
    let mut second = ctx
        .dispatcher()
        .issue_command("apogee", "status")
        .expect("issue");
    assert_eq!(ctx.dispatcher().pending_count(), 2);

    ctx.shutdown();

    assert_eq!(first.wait().await, CommandState::Cancelled);
    assert_eq!(second.wait().await, CommandState::Cancelled);
    assert_eq!(ctx.dispatcher().pending_count(), 0);
    assert!(ctx.dispatcher().issue_command("tcc", "show").is_err());
}

#[tokio::test]
async fn wait_ok_reports_failure_detail() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "tcc");

    let mut invocation = ctx.dispatcher().issue_command("tcc", "track").expect("issue");
    test.reply(invocation.id(), "tcc", MsgCode::Fatal, &["text=\"no such object\""]);

    let err = invocation.wait_ok().await.expect_err("command should fail");
    assert!(err.to_string().contains("no such object"));
}

#[test]
fn keyword_observer_sees_every_update() {
    use parking_lot::Mutex;
    use std::sync::Arc;

    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "mcp");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = ctx.model().subscribe("mcp", "apogeeGang", move |value| {
        sink.lock().push(value.values.clone());
    });

    test.dispatch(&["apogeeGang=\"1\""], None);
    test.dispatch(&["apogeeGang=\"2\""], None);
    assert!(ctx.model().unsubscribe(id));
    test.dispatch(&["apogeeGang=\"3\""], None);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], vec![Scalar::Str("2".into())]);
}

#[tokio::test]
async fn abandoned_wait_still_sees_resolution() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "tcc");
    let mut invocation = ctx.dispatcher().issue_command("tcc", "show").expect("issue");

    let timed_out =
        tokio::time::timeout(std::time::Duration::from_millis(10), invocation.wait()).await;
    assert!(timed_out.is_err());
    assert_eq!(invocation.state(), CommandState::Pending);

    test.reply(invocation.id(), "tcc", MsgCode::Failed, &["text=\"late failure\""]);
    let err = invocation.wait_ok().await.expect_err("failure must surface");
    assert!(err.to_string().contains("late failure"));
    assert_eq!(invocation.wait().await, CommandState::Failed);
}
