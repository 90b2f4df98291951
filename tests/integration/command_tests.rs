//! Reset commands from both ingress paths, end to end through AppService.

use filtermon::adapters::ingress::{self, IngressChannel};
use filtermon::app::commands::{CommandSource, ResetOutcome};
use filtermon::app::events::AppEvent;
use filtermon::app::ledger::FilterId;
use filtermon::app::service::AppService;
use filtermon::app::timestamp::Timestamp;

use crate::mock_ports::*;

/// Service with 120 L already through the meter.
fn primed() -> (AppService<MemStorage>, ManualClock, RecordingSink) {
    let clock = ManualClock::at(NOW_SECS);
    let mut sink = RecordingSink::new();
    let mut app = AppService::start(
        test_config(),
        profile(1.0, 1.0),
        MemStorage::new(),
        DEVICE_ID,
        &clock,
        &mut sink,
    )
    .unwrap();
    let mut pulses = ScriptedPulses::burst(120, 0);
    app.tick(
        &mut pulses,
        &clock,
        &mut RecordingPublisher::offline(),
        &mut CountingDelay::default(),
        &mut sink,
    );
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 120.0);
    sink.events.clear();
    (app, clock, sink)
}

fn assert_processed_invariant(app: &AppService<MemStorage>) {
    let total = app.ledger().aggregate().all_time_volume_l;
    for id in FilterId::ALL {
        let r = app.ledger().record(id);
        assert_eq!(r.processed_volume_l, total - r.initial_volume_l, "{id:?}");
    }
}

#[test]
fn carbon_reset_with_date_rebaselines() {
    let (mut app, clock, mut sink) = primed();
    let body = br#"{"filter":"carbon","date":"2024-01-01 00:00:00"}"#;

    let outcome = app.handle_command(CommandSource::Message, body, &clock, &mut sink);

    let at = Timestamp::parse("2024-01-01 00:00:00").unwrap();
    assert_eq!(outcome, ResetOutcome::Filter { id: FilterId::Carbon, at });
    let carbon = app.ledger().record(FilterId::Carbon);
    assert_eq!(carbon.initial_volume_l, 120.0);
    assert_eq!(carbon.processed_volume_l, 0.0);
    assert_eq!(carbon.last_changed_at, at);
    // Other cartridges keep counting from their own baseline.
    assert_eq!(app.ledger().record(FilterId::Ceramic).processed_volume_l, 120.0);
    assert_processed_invariant(&app);
    assert!(sink.events.contains(&AppEvent::FilterReset {
        id: FilterId::Carbon,
        at,
        source: CommandSource::Message
    }));
}

#[test]
fn form_reset_decodes_percent_encoding() {
    let (mut app, clock, mut sink) = primed();
    let body = b"filter=kdfgac&date=2024-02-29+12%3A30%3A00";

    let outcome = app.handle_command(CommandSource::WebForm, body, &clock, &mut sink);

    let at = Timestamp::parse("2024-02-29 12:30:00").unwrap();
    assert_eq!(outcome, ResetOutcome::Filter { id: FilterId::KdfGac, at });
    assert_eq!(app.ledger().record(FilterId::KdfGac).initial_volume_l, 120.0);
}

#[test]
fn full_reset_zeroes_and_is_idempotent() {
    let (mut app, clock, mut sink) = primed();
    let body = br#"{"command":"full_reset"}"#;

    let first = app.handle_command(CommandSource::Message, body, &clock, &mut sink);
    let after_once = app.ledger().clone();
    let second = app.handle_command(CommandSource::Message, body, &clock, &mut sink);

    let now = Timestamp::from_epoch_secs(NOW_SECS);
    assert_eq!(first, ResetOutcome::Full { at: now });
    assert_eq!(second, first);
    assert_eq!(app.ledger(), &after_once);

    assert_eq!(app.ledger().aggregate().all_time_volume_l, 0.0);
    assert_eq!(app.ledger().aggregate().last_full_reset_at, now);
    for id in FilterId::ALL {
        assert_eq!(app.ledger().record(id).initial_volume_l, 0.0);
        assert_eq!(app.ledger().record(id).processed_volume_l, 0.0);
    }
    assert_processed_invariant(&app);
}

#[test]
fn full_filter_name_in_form_is_full_reset() {
    let (mut app, clock, mut sink) = primed();
    let outcome = app.handle_command(CommandSource::WebForm, b"filter=full", &clock, &mut sink);
    assert!(matches!(outcome, ResetOutcome::Full { .. }));
    assert_eq!(app.ledger().aggregate().all_time_volume_l, 0.0);
}

#[test]
fn unknown_filter_changes_nothing() {
    let (mut app, clock, mut sink) = primed();
    let before = app.ledger().clone();

    let outcome = app.handle_command(CommandSource::WebForm, b"filter=sediment", &clock, &mut sink);

    assert_eq!(outcome, ResetOutcome::Ignored);
    assert_eq!(app.ledger(), &before);
    assert_eq!(
        sink.events,
        vec![AppEvent::CommandIgnored {
            source: CommandSource::WebForm
        }]
    );
}

#[test]
fn malformed_message_is_ignored() {
    let (mut app, clock, mut sink) = primed();
    let before = app.ledger().clone();

    let outcome = app.handle_command(CommandSource::Message, b"{not json", &clock, &mut sink);

    assert_eq!(outcome, ResetOutcome::Ignored);
    assert_eq!(app.ledger(), &before);
}

#[test]
fn bad_date_falls_back_to_clock() {
    let (mut app, clock, mut sink) = primed();
    let body = br#"{"filter":"ceramic","date":"yesterday"}"#;

    let outcome = app.handle_command(CommandSource::Message, body, &clock, &mut sink);

    let now = Timestamp::from_epoch_secs(NOW_SECS);
    assert_eq!(outcome, ResetOutcome::Filter { id: FilterId::Ceramic, at: now });
    assert_eq!(app.ledger().record(FilterId::Ceramic).last_changed_at, now);
}

#[test]
fn reset_without_date_before_time_sync_uses_epoch() {
    let clock = ManualClock::unsynced();
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

    let outcome = app.handle_command(CommandSource::WebForm, b"filter=carbon", &clock, &mut sink);
    assert_eq!(
        outcome,
        ResetOutcome::Filter {
            id: FilterId::Carbon,
            at: Timestamp::EPOCH
        }
    );
}

#[test]
fn reset_resets_remaining_life() {
    let (mut app, clock, mut sink) = primed();
    let limit = app.config().limits.carbon.max_volume_l;
    assert_eq!(app.projections()[FilterId::Carbon.index()].remaining_volume_l, limit - 120.0);

    app.handle_command(CommandSource::WebForm, b"filter=carbon", &clock, &mut sink);

    let p = app.projections()[FilterId::Carbon.index()];
    assert_eq!(p.remaining_volume_l, limit);
    assert_eq!(p.days_since_changed, 0);
}

#[test]
fn ingress_frames_apply_in_arrival_order() {
    let (mut app, clock, mut sink) = primed();
    let channel = IngressChannel::new();

    assert!(ingress::submit_to(&channel, CommandSource::Message, br#"{"command":"full_reset"}"#));
    assert!(ingress::submit_to(&channel, CommandSource::WebForm, b"filter=carbon"));

    let mut outcomes = Vec::new();
    ingress::drain_from(&channel, |frame| {
        outcomes.push(app.handle_command(frame.source, &frame.body, &clock, &mut sink));
    });

    assert!(matches!(outcomes[0], ResetOutcome::Full { .. }));
    assert!(matches!(outcomes[1], ResetOutcome::Filter { id: FilterId::Carbon, .. }));
    // Carbon was rebaselined after the full reset zeroed the total.
    assert_eq!(app.ledger().record(FilterId::Carbon).initial_volume_l, 0.0);
}
