//! AppService tick pipeline: pulses → ledger → durable store → publish.

use filtermon::app::events::AppEvent;
use filtermon::app::ledger::FilterId;
use filtermon::app::ports::PublishError;
use filtermon::app::service::AppService;

use crate::mock_ports::*;

fn start(ppl: f32, k: f32) -> (AppService<MemStorage>, ManualClock, RecordingSink) {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let app = AppService::start(
        test_config(),
        profile(ppl, k),
        MemStorage::new(),
        DEVICE_ID,
        &clock,
        &mut sink,
    )
    .unwrap();
    (app, clock, sink)
}

#[test]
fn start_on_blank_flash_emits_fresh_store() {
    let (app, _clock, sink) = start(450.0, 1.0);
    assert_eq!(
        sink.events[0],
        AppEvent::Started {
            all_time_volume_l: 0.0,
            fresh_store: true
        }
    );
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 0.0);
}

#[test]
fn four_hundred_fifty_pulses_is_one_litre() {
    let (mut app, clock, mut sink) = start(450.0, 1.0);
    let mut pulses = ScriptedPulses::burst(450, 900);
    let mut publisher = RecordingPublisher::online();
    let mut delay = CountingDelay::default();

    clock.advance_ms(1_000);
    let out = app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    assert_eq!(out.volume_delta_l, Some(1.0));
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 1.0);
    for id in FilterId::ALL {
        assert_eq!(app.ledger().record(id).processed_volume_l, 1.0);
    }
    assert!(out.flow_detected);
}

#[test]
fn zero_calibration_leaves_total_and_warns() {
    let (mut app, clock, mut sink) = start(0.0, 1.0);
    let mut pulses = ScriptedPulses::burst(100, 0);
    let mut publisher = RecordingPublisher::online();
    let mut delay = CountingDelay::default();

    let out = app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    assert_eq!(out.volume_delta_l, None);
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 0.0);
    assert!(sink.events.contains(&AppEvent::VolumeDiscarded { pulses: 100 }));
}

#[test]
fn flow_rate_follows_pulse_frequency() {
    let (mut app, clock, mut sink) = start(450.0, 7.5);
    let mut publisher = RecordingPublisher::offline();
    let mut delay = CountingDelay::default();
    let mut pulses = ScriptedPulses::default();
    pulses.push(0, 0);
    pulses.push(75, 1_900);

    // First tick has no previous tick to measure against.
    let first = app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);
    assert_eq!(first.flow_rate_l_min, 0.0);

    clock.advance_ms(2_000);
    let second = app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);
    // 75 pulses over 2 s = 37.5 Hz; / 7.5 = 5 L/min.
    assert!((second.flow_rate_l_min - 5.0).abs() < 1e-4);
    assert_eq!(app.status().flowrate, "5.00");
}

#[test]
fn flow_detection_times_out() {
    let (mut app, clock, mut sink) = start(450.0, 1.0);
    let mut publisher = RecordingPublisher::offline();
    let mut delay = CountingDelay::default();
    let mut pulses = ScriptedPulses::burst(10, 0);

    clock.advance_ms(1_000);
    assert!(app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink).flow_detected);

    // The accumulator keeps reporting the last pulse time.
    pulses.push(0, 0);
    clock.advance_ms(1_500);
    assert!(!app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink).flow_detected);
}

#[test]
fn tick_publishes_every_filter_and_aggregate() {
    let (mut app, clock, mut sink) = start(450.0, 1.0);
    let mut pulses = ScriptedPulses::burst(900, 0);
    let mut publisher = RecordingPublisher::online();
    let mut delay = CountingDelay::default();

    app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    assert_eq!(publisher.sent.len(), 4);
    let carbon = publisher.json("home/DEADBEEFCAFE/carbonFilter").unwrap();
    assert_eq!(carbon["totalLitres"], 2.0);
    assert_eq!(carbon["lastChanged"], "1970-01-01 00:00:00");
    assert!(carbon["remainingLife"].as_str().unwrap().ends_with(" L"));

    let all = publisher.json("home/DEADBEEFCAFE/allTime").unwrap();
    assert_eq!(all["allTimeLitres"], 2.0);
    assert_eq!(all["lastFullReset"], 0);
    assert!(publisher.json("home/DEADBEEFCAFE/kdfGacFilter").is_some());
    assert!(publisher.json("home/DEADBEEFCAFE/ceramicFilter").is_some());
}

#[test]
fn offline_broker_skips_publishing() {
    let (mut app, clock, mut sink) = start(450.0, 1.0);
    let mut pulses = ScriptedPulses::burst(450, 0);
    let mut publisher = RecordingPublisher::offline();
    let mut delay = CountingDelay::default();

    app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    assert_eq!(publisher.attempts, 0);
    assert_eq!(delay.calls, 0);
    assert!(sink.events.contains(&AppEvent::PublishSkipped));
    // Integration is unaffected by the link state.
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 1.0);
}

#[test]
fn transient_publish_failure_is_retried() {
    let (mut app, clock, mut sink) = start(450.0, 1.0);
    let mut pulses = ScriptedPulses::default();
    let mut publisher = RecordingPublisher::online();
    publisher.fail_next = 2;
    let mut delay = CountingDelay::default();

    app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    // First topic needed three attempts, the other three one each.
    assert_eq!(publisher.attempts, 6);
    assert_eq!(publisher.sent.len(), 4);
    assert_eq!(delay.calls, 2);
    assert_eq!(
        delay.total_ns,
        2 * u64::from(app.config().publish_retry_backoff_ms) * 1_000_000
    );
    assert_eq!(sink.count(|e| matches!(e, AppEvent::PublishDropped { .. })), 0);
}

#[test]
fn exhausted_retries_drop_without_touching_ledger() {
    let (mut app, clock, mut sink) = start(450.0, 1.0);
    let mut pulses = ScriptedPulses::burst(450, 0);
    let mut publisher = RecordingPublisher::online();
    publisher.fail_next = usize::MAX;
    let mut delay = CountingDelay::default();

    app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    let retries = usize::from(app.config().publish_retry_count);
    assert_eq!(publisher.attempts, 4 * retries);
    assert_eq!(delay.calls, 4 * (retries - 1));
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::PublishDropped { error: PublishError::Rejected, .. })),
        4
    );
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 1.0);
}

#[test]
fn storage_failure_during_tick_is_reported_not_fatal() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = AppService::start(
        test_config(),
        profile(450.0, 1.0),
        MemStorage::new(),
        DEVICE_ID,
        &clock,
        &mut sink,
    )
    .unwrap();

    // Swap in failing flash by restarting over a storage that refuses writes
    // once initialised.
    let mut failing = MemStorage::new();
    failing.blobs = app.store().storage().blobs.clone();
    failing.fail_writes = true;
    app = AppService::start(
        test_config(),
        profile(450.0, 1.0),
        failing,
        DEVICE_ID,
        &clock,
        &mut sink,
    )
    .unwrap();

    let mut pulses = ScriptedPulses::burst(450, 0);
    let mut publisher = RecordingPublisher::offline();
    let mut delay = CountingDelay::default();
    app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);

    assert_eq!(app.ledger().aggregate().all_time_volume_l, 1.0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::StorageFailed(_))), 1);
}

#[test]
fn storage_failure_at_start_is_fatal() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut flash = MemStorage::new();
    flash.fail_writes = true;

    let result = AppService::start(
        test_config(),
        profile(450.0, 1.0),
        flash,
        DEVICE_ID,
        &clock,
        &mut sink,
    );
    assert!(matches!(result, Err(filtermon::error::Error::Storage(_))));
}

#[test]
fn unsynced_clock_saturates_day_counts() {
    let clock = ManualClock::unsynced();
    let mut sink = RecordingSink::new();
    let app = AppService::start(
        test_config(),
        profile(450.0, 1.0),
        MemStorage::new(),
        DEVICE_ID,
        &clock,
        &mut sink,
    )
    .unwrap();

    for (id, p) in FilterId::ALL.iter().zip(app.projections()) {
        assert_eq!(p.days_since_changed, 0);
        assert_eq!(p.remaining_days, app.config().limits.get(*id).max_days);
    }
}

#[test]
fn status_reflects_ledger_and_projection() {
    let (mut app, clock, mut sink) = start(1.0, 1.0);
    let mut pulses = ScriptedPulses::burst(1_500, 0);
    let mut publisher = RecordingPublisher::offline();
    let mut delay = CountingDelay::default();

    app.tick(&mut pulses, &clock, &mut publisher, &mut delay, &mut sink);
    let status = app.status();

    assert_eq!(status.total_litres, "1.50k");
    assert_eq!(status.carbon_total, "1.50k");
    // 10 000 L rated carbon cartridge.
    assert_eq!(status.carbon_remaining, "8.50k");

    let json: serde_json::Value = serde_json::from_str(&status.to_json()).unwrap();
    assert_eq!(json["totalLitres"], "1.50k");
    assert!(json.get("kdfgacRemainingDays").is_some());
}
