//! # Scheduler
//!
//! Drives an [`AssociationEngine`] from a [`PickSource`] until the source is exhausted or the
//! run is cancelled, then closes every remaining candidate. The same loop serves both run
//! modes; they differ only in the pick source and in which origins are kept:
//!
//! | mode       | source                               | retained origins            |
//! |------------|--------------------------------------|-----------------------------|
//! | offline    | [`OfflineSource`], drain as fast as possible | final revision per event |
//! | playback   | [`PlaybackSource`], paced by detection times | every revision          |
//!
//! ## Cancellation
//!
//! [`Scheduler::cancel_handle`] returns a shared flag. Raising it stops the intake at the next
//! pick (or during a playback wait); the open candidates are then closed as at the end of a
//! normal run, each emitting its best origin if it has one.
//!
//! ## Example
//!
//! ```rust, no_run
//! use std::sync::Arc;
//! use octoloc::{
//!     association::{AssociationEngine, AssociatorParams},
//!     octree::{SearchParams, SearchVolume},
//!     picks::pick_buffer::{PickBuffer, PickFilter},
//!     scheduler::{pick_source::OfflineSource, Retention, Scheduler},
//!     stations::StationCatalog,
//!     velocity_model::ConstantVelocityModel,
//! };
//!
//! let volume = SearchVolume::new(46.0, 8.0, 200.0, 0.0, 40.0).unwrap();
//! let catalog = Arc::new(StationCatalog::from_inventory(Vec::new(), &volume, None).unwrap());
//! let buffer = PickBuffer::new(catalog, PickFilter::default()).unwrap();
//!
//! let engine = AssociationEngine::new(
//!     Arc::new(ConstantVelocityModel::default()),
//!     volume,
//!     SearchParams::default(),
//!     AssociatorParams::default(),
//! );
//! let mut scheduler = Scheduler::new(engine, Retention::FinalRevision);
//! let report = scheduler.run(OfflineSource::new(buffer));
//! println!("{report}");
//! ```
pub mod pick_source;
#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::info;

use crate::{
    association::{AssociationEngine, EngineEvent, EngineStats},
    constants::EventId,
    origin::Origin,
    picks::pick_buffer::IntakeStats,
};

pub use pick_source::{OfflineSource, PickSource, PlaybackOptions, PlaybackSource};

#[cfg(feature = "progress")]
use progress_bar::RunProgress;

/// How a run is paced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    Offline,
    Playback(PlaybackOptions),
}

impl RunMode {
    /// Origins kept by default in this mode.
    pub fn retention(&self) -> Retention {
        match self {
            RunMode::Offline => Retention::FinalRevision,
            RunMode::Playback(_) => Retention::History,
        }
    }
}

/// Which origin revisions a run keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Every revision, in emission order
    History,
    /// The last revision of each located event, by event id; a withdrawn origin is dropped
    FinalRevision,
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub intake: IntakeStats,
    pub engine: EngineStats,
    pub origins: Vec<Origin>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn events_created(&self) -> usize {
        self.engine.created
    }

    pub fn events_located(&self) -> usize {
        self.engine.located
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "intake   {}", self.intake)?;
        writeln!(f, "engine   {}", self.engine)?;
        write!(
            f,
            "origins  {}{}",
            self.origins.len(),
            if self.cancelled { "   (cancelled)" } else { "" }
        )
    }
}

enum Retained {
    History(Vec<Origin>),
    Final(BTreeMap<EventId, Origin>),
}

impl Retained {
    fn new(retention: Retention) -> Self {
        match retention {
            Retention::History => Retained::History(Vec::new()),
            Retention::FinalRevision => Retained::Final(BTreeMap::new()),
        }
    }

    fn keep(&mut self, event: &EngineEvent) {
        match (self, event) {
            (Retained::History(origins), EngineEvent::Revision(origin)) => {
                origins.push(origin.clone())
            }
            (Retained::History(_), _) => {}
            (Retained::Final(last), EngineEvent::Withdrawn { event_id }) => {
                last.remove(event_id);
            }
            (Retained::Final(last), _) => {
                if let Some(origin) = event.origin() {
                    last.insert(origin.event_id, origin.clone());
                }
            }
        }
    }

    fn into_origins(self) -> Vec<Origin> {
        match self {
            Retained::History(origins) => origins,
            Retained::Final(last) => last.into_values().collect(),
        }
    }
}

/// Run loop around an association engine.
pub struct Scheduler {
    engine: AssociationEngine,
    retention: Retention,
    cancel: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(engine: AssociationEngine, retention: Retention) -> Self {
        Scheduler {
            engine,
            retention,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag stopping the run when raised.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn engine(&self) -> &AssociationEngine {
        &self.engine
    }

    /// Run to completion, keeping origins according to the retention policy.
    pub fn run<S: PickSource>(&mut self, source: S) -> RunReport {
        self.run_with(source, |_| {})
    }

    /// Run to completion, handing every engine event to `on_event` as it happens.
    ///
    /// Arguments
    /// -----------------
    /// * `source`: the pick source.
    /// * `on_event`: consumer of origin revisions and closings, called in emission order.
    ///
    /// Return
    /// ----------
    /// * The [`RunReport`]. After a cancellation it still holds the final origins of the
    ///   candidates open at that time.
    pub fn run_with<S, F>(&mut self, mut source: S, mut on_event: F) -> RunReport
    where
        S: PickSource,
        F: FnMut(&EngineEvent),
    {
        let mut retained = Retained::new(self.retention);

        #[cfg(feature = "progress")]
        let mut progress = RunProgress::new(source.remaining());

        let cancelled = loop {
            if self.cancel.load(Ordering::Relaxed) {
                break true;
            }
            let Some(pick) = source.next_pick(&self.cancel) else {
                break self.cancel.load(Ordering::Relaxed);
            };
            for event in self.engine.process_pick(pick) {
                retained.keep(&event);
                on_event(&event);
            }

            #[cfg(feature = "progress")]
            progress.tick(self.engine.candidates().count());
        };

        #[cfg(feature = "progress")]
        progress.finish();

        if cancelled {
            info!(
                open = self.engine.candidates().count(),
                "run cancelled, closing open candidates"
            );
        }
        for event in self.engine.finish() {
            retained.keep(&event);
            on_event(&event);
        }

        let report = RunReport {
            intake: source.intake_stats(),
            engine: self.engine.stats().clone(),
            origins: retained.into_origins(),
            cancelled,
        };
        info!(
            accepted = report.intake.accepted,
            rejected = report.intake.rejected(),
            created = report.engine.created,
            located = report.engine.located,
            origins = report.origins.len(),
            "run finished"
        );
        report
    }
}
