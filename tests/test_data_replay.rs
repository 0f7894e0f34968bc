use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use stui::hub::storage::{config_path, load_config_or_default, write_config};
use stui::hub::{HubConfig, HubContext, Scalar};
use stui::testdata::{TestDispatcher, tcc_status};
use tempfile::TempDir;

#[tokio::test]
async fn tcc_stream_drives_model_in_order() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, tcc_status::ACTOR);
    tcc_status::init(&test);

    let slews = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&slews);
    ctx.model().subscribe(tcc_status::ACTOR, "SlewEnd", move |_| {
        *sink.lock() += 1;
    });

    let rot = Arc::new(Mutex::new(Vec::new()));
    let rot_sink = Arc::clone(&rot);
    ctx.model().subscribe(tcc_status::ACTOR, "AxePos", move |value| {
        if let Some(pos) = value.values.get(2).and_then(Scalar::as_f64) {
            rot_sink.lock().push(pos);
        }
    });

    tcc_status::run_test(&test, Duration::from_millis(1)).await;

    assert_eq!(*slews.lock(), 3);
    let rot = rot.lock();
    assert!(rot.iter().take_while(|p| p.is_nan()).count() >= 7);
    assert_eq!(rot.last().copied(), Some(5.0));
    assert_eq!(
        ctx.model().value(tcc_status::ACTOR, "ObjName", 0),
        Some(Scalar::Str("test object with a long name".into()))
    );
}

#[tokio::test]
async fn run_data_set_uses_default_actor() {
    let ctx = HubContext::new(HubConfig::test());
    let test = TestDispatcher::new(&ctx, "guider");
    let sets: &[&[&str]] = &[&["guideState=on"], &["guideState=off", "expTime=5.0"]];

    test.run_data_set(sets, Duration::ZERO).await;

    assert_eq!(
        ctx.model().value("guider", "guideState", 0),
        Some(Scalar::Str("off".into()))
    );
    assert_eq!(ctx.model().keywords("guider"), vec!["expTime", "guideState"]);
}

#[test]
fn config_file_selects_test_mode() {
    let temp = TempDir::new().expect("tempdir");
    let path = config_path(temp.path());

    let config = HubConfig {
        program: "TUI".into(),
        replay_interval_ms: 10,
        ..HubConfig::test()
    };
    write_config(&path, &config).expect("write config");

    let loaded = load_config_or_default(&path).expect("load config");
    assert_eq!(loaded, config);

    let ctx = HubContext::new(loaded);
    assert!(ctx.connection().is_null());
    assert_eq!(ctx.dispatcher().name(), "tui");
}
