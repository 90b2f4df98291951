//! Application service: the hexagonal core.
//!
//! [`AppService`] is the single owned context: it holds the ledger, the
//! integrator, the durable store and the topic set, and it is the only
//! thing that mutates the ledger.  The main loop calls [`AppService::tick`]
//! and [`AppService::handle_command`] one at a time, so a reset and a tick
//! never interleave; each finishes (persistence included) before the next
//! begins.
//!
//! ```text
//!  PulseSource ──▶ ┌──────────────────────────┐ ──▶ PublishPort
//!    ClockPort ──▶ │        AppService         │ ──▶ EventSink
//!  command body ─▶ │ Integrator · Ledger ·     │
//!                  │ CommandProcessor          │ ◀─▶ DurableStore<StoragePort>
//!                  └──────────────────────────┘
//! ```

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::calibration::CalibrationProfile;
use crate::config::SystemConfig;
use crate::error::Result;
use crate::storage::DurableStore;

use super::commands::{self, CommandProcessor, CommandSource, ResetOutcome};
use super::events::{AppEvent, FlowTelemetry};
use super::integrator::{FlowIntegrator, TickOutcome};
use super::ledger::{FilterId, FilterLedger, LifeProjection};
use super::ports::{ClockPort, EventSink, PublishPort, PulseSource, StoragePort};
use super::publish::{AggregatePayload, FilterPayload, TopicSet, publish_with_retry};
use super::status::StatusReport;
use super::timestamp::Timestamp;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<S: StoragePort> {
    config: SystemConfig,
    ledger: FilterLedger,
    integrator: FlowIntegrator,
    processor: CommandProcessor,
    store: DurableStore<S>,
    topics: TopicSet,
    last_tick: TickOutcome,
    projections: [LifeProjection; 3],
}

impl<S: StoragePort> AppService<S> {
    /// Bring the durable region up and load the ledger from it.
    ///
    /// Storage failure here is fatal: running on a ledger that cannot be
    /// persisted would silently lose every litre counted.
    pub fn start(
        config: SystemConfig,
        calibration: CalibrationProfile,
        storage: S,
        device_id: &str,
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Result<Self> {
        let mut store = DurableStore::new(storage);
        let fresh_store = store.ensure_initialized()?;
        let mut ledger = store.read_all()?;

        let now = wall_clock_or_epoch(clock);
        let projections = ledger.project_all(&config.limits, now, config.estimate_idle_usage);

        let topics = TopicSet::new(&config.topic_base, device_id);
        info!("AppService: publishing under {}/{}", config.topic_base, device_id);

        sink.emit(&AppEvent::Started {
            all_time_volume_l: ledger.aggregate().all_time_volume_l,
            fresh_store,
        });

        Ok(Self {
            integrator: FlowIntegrator::new(calibration, config.no_flow_timeout_ms),
            processor: CommandProcessor::new(),
            config,
            ledger,
            store,
            topics,
            last_tick: TickOutcome::default(),
            projections,
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn ledger(&self) -> &FilterLedger {
        &self.ledger
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn last_tick(&self) -> &TickOutcome {
        &self.last_tick
    }

    pub fn projections(&self) -> &[LifeProjection; 3] {
        &self.projections
    }

    pub fn store(&self) -> &DurableStore<S> {
        &self.store
    }

    // ── Flow tick ─────────────────────────────────────────────

    /// One integration tick: drain pulses, integrate, project, persist,
    /// publish.  Publishing may block for the retry backoff.
    pub fn tick<P, D>(
        &mut self,
        pulses: &mut impl PulseSource,
        clock: &impl ClockPort,
        publisher: &mut P,
        delay: &mut D,
        sink: &mut impl EventSink,
    ) -> TickOutcome
    where
        P: PublishPort + ?Sized,
        D: DelayNs + ?Sized,
    {
        let snapshot = pulses.take_pulses();
        let outcome = self.integrator.integrate(snapshot, clock.monotonic_ms(), &mut self.ledger);
        self.last_tick = outcome;

        match outcome.volume_delta_l {
            Some(delta) => sink.emit(&AppEvent::FlowTick(FlowTelemetry {
                pulses: outcome.pulses,
                volume_delta_l: delta,
                all_time_volume_l: self.ledger.aggregate().all_time_volume_l,
                flow_rate_l_min: outcome.flow_rate_l_min,
                flow_detected: outcome.flow_detected,
            })),
            None => sink.emit(&AppEvent::VolumeDiscarded { pulses: outcome.pulses }),
        }

        self.reproject(clock);

        if let Err(e) = self.store.write_ledger(&self.ledger) {
            sink.emit(&AppEvent::StorageFailed(e));
        }

        self.publish_snapshot(publisher, delay, sink);
        outcome
    }

    fn reproject(&mut self, clock: &impl ClockPort) {
        let now = wall_clock_or_epoch(clock);
        self.projections =
            self.ledger
                .project_all(&self.config.limits, now, self.config.estimate_idle_usage);
    }

    /// Publish every cartridge and the aggregate.  Skipped entirely while
    /// the broker link is down.
    pub fn publish_snapshot<P, D>(
        &self,
        publisher: &mut P,
        delay: &mut D,
        sink: &mut impl EventSink,
    ) where
        P: PublishPort + ?Sized,
        D: DelayNs + ?Sized,
    {
        if !publisher.is_connected() {
            sink.emit(&AppEvent::PublishSkipped);
            return;
        }

        for id in FilterId::ALL {
            let payload = FilterPayload::new(self.ledger.record(id), &self.projections[id.index()]);
            self.publish_json(publisher, delay, sink, self.topics.filter(id), &payload);
        }
        let payload = AggregatePayload::new(self.ledger.aggregate());
        self.publish_json(publisher, delay, sink, self.topics.all_time(), &payload);
    }

    fn publish_json<P, D>(
        &self,
        publisher: &mut P,
        delay: &mut D,
        sink: &mut impl EventSink,
        topic: &str,
        payload: &impl serde::Serialize,
    ) where
        P: PublishPort + ?Sized,
        D: DelayNs + ?Sized,
    {
        let Ok(body) = serde_json::to_vec(payload) else {
            warn!("PUBLISH | {} payload failed to serialise", topic);
            return;
        };
        if let Err(error) = publish_with_retry(
            publisher,
            delay,
            topic,
            &body,
            self.config.publish_retry_count,
            self.config.publish_retry_backoff_ms,
        ) {
            sink.emit(&AppEvent::PublishDropped { topic: topic.to_owned(), error });
        }
    }

    // ── Commands ──────────────────────────────────────────────

    /// Decode and apply one reset command body.
    ///
    /// Undecodable bodies and unknown targets change nothing.  Only the
    /// touched records are persisted: one record for a single-filter
    /// reset, the aggregate plus all three records for a full reset.
    pub fn handle_command(
        &mut self,
        source: CommandSource,
        body: &[u8],
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) -> ResetOutcome {
        let decoded = match source {
            CommandSource::WebForm => core::str::from_utf8(body)
                .map_err(|_| commands::CommandError::Malformed)
                .and_then(commands::decode_form),
            CommandSource::Message => commands::decode_message(body),
        };
        let request = match decoded {
            Ok(request) => request,
            Err(e) => {
                warn!("Command ({}): {}, ignored", source.as_str(), e);
                sink.emit(&AppEvent::CommandIgnored { source });
                return ResetOutcome::Ignored;
            }
        };

        let now = wall_clock_or_epoch(clock);
        let outcome = self.processor.apply(&mut self.ledger, &request, now);
        if outcome != ResetOutcome::Ignored {
            self.reproject(clock);
        }

        let persisted = match outcome {
            ResetOutcome::Filter { id, at } => {
                sink.emit(&AppEvent::FilterReset { id, at, source });
                self.store.write_record(id, self.ledger.record(id))
            }
            ResetOutcome::Full { at } => {
                sink.emit(&AppEvent::FullReset { at, source });
                self.store.write_ledger(&self.ledger)
            }
            ResetOutcome::Ignored => {
                sink.emit(&AppEvent::CommandIgnored { source });
                Ok(())
            }
        };
        if let Err(e) = persisted {
            sink.emit(&AppEvent::StorageFailed(e));
        }
        outcome
    }

    // ── Status ────────────────────────────────────────────────

    pub fn status(&self) -> StatusReport {
        StatusReport::new(
            &self.ledger,
            &self.projections,
            self.last_tick.flow_rate_l_min,
            self.last_tick.flow_detected,
        )
    }
}

/// Before network time sync there is no wall clock; day counts then
/// saturate to zero and resets without a date are stamped at the epoch.
fn wall_clock_or_epoch(clock: &impl ClockPort) -> Timestamp {
    clock.wall_clock().unwrap_or(Timestamp::EPOCH)
}
