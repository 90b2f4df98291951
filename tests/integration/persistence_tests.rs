//! Durable state across simulated reboots.

use filtermon::app::commands::CommandSource;
use filtermon::app::events::AppEvent;
use filtermon::app::ledger::FilterId;
use filtermon::app::service::AppService;
use filtermon::storage::layout::{self, REGION_LEN};
use filtermon::storage::{STORE_KEY, STORE_NAMESPACE};

use crate::mock_ports::*;

fn boot(
    flash: MemStorage,
    clock: &ManualClock,
    sink: &mut RecordingSink,
) -> AppService<MemStorage> {
    AppService::start(test_config(), profile(1.0, 1.0), flash, DEVICE_ID, clock, sink).unwrap()
}

fn blob_key() -> String {
    format!("{STORE_NAMESPACE}::{STORE_KEY}")
}

#[test]
fn ledger_survives_reboot() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = boot(MemStorage::new(), &clock, &mut sink);

    let mut pulses = ScriptedPulses::burst(250, 0);
    app.tick(
        &mut pulses,
        &clock,
        &mut RecordingPublisher::offline(),
        &mut CountingDelay::default(),
        &mut sink,
    );
    app.handle_command(
        CommandSource::Message,
        br#"{"filter":"ceramic","date":"2024-05-01 08:00:00"}"#,
        &clock,
        &mut sink,
    );
    let before = app.ledger().clone();

    // Power cycle: the same flash goes into a fresh service.
    let flash = app.store().storage().clone();
    let mut sink2 = RecordingSink::new();
    let revived = boot(flash, &clock, &mut sink2);

    assert_eq!(revived.ledger(), &before);
    assert_eq!(
        sink2.events[0],
        AppEvent::Started {
            all_time_volume_l: 250.0,
            fresh_store: false
        }
    );
}

#[test]
fn single_reset_persists_without_full_rewrite() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = boot(MemStorage::new(), &clock, &mut sink);
    let writes_before = app.store().storage().writes;

    app.handle_command(CommandSource::WebForm, b"filter=carbon", &clock, &mut sink);

    assert_eq!(app.store().storage().writes, writes_before + 1);
    let blob = &app.store().storage().blobs[&blob_key()];
    let stored = layout::decode_region(blob).unwrap();
    assert_eq!(stored.record(FilterId::Carbon), app.ledger().record(FilterId::Carbon));
}

#[test]
fn full_reset_is_one_write() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = boot(MemStorage::new(), &clock, &mut sink);
    let writes_before = app.store().storage().writes;

    app.handle_command(CommandSource::Message, br#"{"command":"full_reset"}"#, &clock, &mut sink);

    assert_eq!(app.store().storage().writes, writes_before + 1);
    let stored = layout::decode_region(&app.store().storage().blobs[&blob_key()]).unwrap();
    assert_eq!(&stored, app.ledger());
}

#[test]
fn ignored_command_writes_nothing() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = boot(MemStorage::new(), &clock, &mut sink);
    let writes_before = app.store().storage().writes;

    app.handle_command(CommandSource::WebForm, b"date=2024-01-01+00%3A00%3A00", &clock, &mut sink);

    assert_eq!(app.store().storage().writes, writes_before);
}

#[test]
fn corrupted_flag_reinitialises() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = boot(MemStorage::new(), &clock, &mut sink);
    let mut pulses = ScriptedPulses::burst(42, 0);
    app.tick(
        &mut pulses,
        &clock,
        &mut RecordingPublisher::offline(),
        &mut CountingDelay::default(),
        &mut sink,
    );

    let mut flash = app.store().storage().clone();
    flash.blobs.get_mut(&blob_key()).unwrap()[0] = 0x00;

    let mut sink2 = RecordingSink::new();
    let revived = boot(flash, &clock, &mut sink2);

    assert_eq!(revived.ledger().aggregate().all_time_volume_l, 0.0);
    assert_eq!(
        sink2.events[0],
        AppEvent::Started {
            all_time_volume_l: 0.0,
            fresh_store: true
        }
    );
    assert_eq!(revived.store().storage().blobs[&blob_key()].len(), REGION_LEN);
}

#[test]
fn remaining_life_is_persisted_with_record() {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = boot(MemStorage::new(), &clock, &mut sink);
    let mut pulses = ScriptedPulses::burst(500, 0);
    app.tick(
        &mut pulses,
        &clock,
        &mut RecordingPublisher::offline(),
        &mut CountingDelay::default(),
        &mut sink,
    );

    let blob = &app.store().storage().blobs[&blob_key()];
    let stored = layout::decode_region(blob).unwrap();
    let limit = app.config().limits.ceramic;
    assert_eq!(stored.record(FilterId::Ceramic).remaining_volume_l, limit.max_volume_l - 500.0);
    assert_eq!(
        stored.record(FilterId::Ceramic).remaining_days,
        app.projections()[2].remaining_days
    );
}
