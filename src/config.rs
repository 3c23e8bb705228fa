//! # Run configuration
//!
//! [`LocatorConfig`] gathers everything a run needs: the search volume, the velocity model,
//! the association and octree parameters, the run mode and the pick intake filters. It is the
//! single place where cross-cutting consistency is checked, before any pick is processed.
//!
//! The configuration also acts as a factory for the run components:
//!
//! ```rust
//! use octoloc::{config::LocatorConfig, octree::SearchVolume, stations::InventoryRecord};
//!
//! let volume = SearchVolume::new(-21.0, -69.5, 250.0, 0.0, 200.0).unwrap();
//! let config = LocatorConfig::builder(volume)
//!     .velocity_model("6.0".parse().unwrap())
//!     .authors(vec!["scautopick*".into(), "dlpick".into()])
//!     .build()
//!     .unwrap();
//!
//! let catalog = config.catalog(Vec::<InventoryRecord>::new()).unwrap();
//! assert!(catalog.is_empty());
//! println!("{config:#}");
//! ```
use std::{fmt, sync::Arc};

use hifitime::Epoch;

use crate::{
    association::{AssociationEngine, AssociatorParams},
    octoloc_errors::OctolocError,
    octree::{SearchParams, SearchVolume},
    picks::pick_buffer::{PickBuffer, PickFilter},
    scheduler::{
        pick_source::{OfflineSource, PickSource, PlaybackSource},
        RunMode, Scheduler,
    },
    stations::{whitelist::StreamWhitelist, InventoryRecord, StationCatalog},
    time::time_to_str,
    velocity_model::ConstantVelocityModel,
};

/// Validated configuration of a run.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub volume: SearchVolume,
    pub model: ConstantVelocityModel,
    pub associator: AssociatorParams,
    pub search: SearchParams,
    pub mode: RunMode,
    pub filter: PickFilter,
}

impl LocatorConfig {
    pub fn builder(volume: SearchVolume) -> LocatorConfigBuilder {
        LocatorConfigBuilder::new(volume)
    }

    /// Station catalog restricted to the volume and the whitelist.
    pub fn catalog<I>(&self, records: I) -> Result<StationCatalog, OctolocError>
    where
        I: IntoIterator<Item = InventoryRecord>,
    {
        StationCatalog::from_inventory(records, &self.volume, self.filter.whitelist.as_ref())
    }

    /// Empty pick buffer applying the intake filters.
    pub fn pick_buffer(&self, catalog: Arc<StationCatalog>) -> Result<PickBuffer, OctolocError> {
        Ok(PickBuffer::new(catalog, self.filter.clone())?
            .with_duplicate_horizon(self.associator.quiescence))
    }

    /// Pick source of the configured run mode over a filled buffer.
    pub fn pick_source(&self, buffer: PickBuffer) -> Result<Box<dyn PickSource>, OctolocError> {
        let source: Box<dyn PickSource> = match &self.mode {
            RunMode::Offline => Box::new(OfflineSource::new(buffer)),
            RunMode::Playback(options) => Box::new(PlaybackSource::new(buffer, options)?),
        };
        Ok(source)
    }

    pub fn engine(&self) -> AssociationEngine {
        AssociationEngine::new(
            Arc::new(self.model),
            self.volume.clone(),
            self.search.clone(),
            self.associator.clone(),
        )
    }

    /// Scheduler with the retention policy of the run mode.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.engine(), self.mode.retention())
    }
}

impl fmt::Display for LocatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            return write!(
                f,
                "LocatorConfig({}, {}, {}, mode={:?})",
                self.volume, self.model, self.associator, self.mode
            );
        }
        writeln!(f, "{}", self.volume)?;
        writeln!(f, "{}", self.model)?;
        match &self.mode {
            RunMode::Offline => writeln!(f, "mode: offline")?,
            RunMode::Playback(o) => writeln!(
                f,
                "mode: playback (accelerate={}, use_pick_time={}, speed={})",
                o.accelerate, o.use_pick_time, o.speed
            )?,
        }
        if self.filter.authors.is_empty() {
            writeln!(f, "authors: any")?;
        } else {
            writeln!(f, "authors: {}", self.filter.authors.join(", "))?;
        }
        if let Some(whitelist) = &self.filter.whitelist {
            writeln!(f, "whitelist: {} item(s)", whitelist.len())?;
        }
        if let Some((start, end)) = &self.filter.time_range {
            writeln!(
                f,
                "time range: {} .. {}",
                time_to_str(start, 0),
                time_to_str(end, 0)
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:#}", self.associator)?;
        write!(f, "{:#}", self.search)
    }
}

/// Builder for [`LocatorConfig`].
#[derive(Debug, Clone)]
pub struct LocatorConfigBuilder {
    config: LocatorConfig,
}

impl LocatorConfigBuilder {
    pub fn new(volume: SearchVolume) -> Self {
        LocatorConfigBuilder {
            config: LocatorConfig {
                volume,
                model: ConstantVelocityModel::default(),
                associator: AssociatorParams::default(),
                search: SearchParams::default(),
                mode: RunMode::Offline,
                filter: PickFilter::default(),
            },
        }
    }

    pub fn velocity_model(mut self, model: ConstantVelocityModel) -> Self {
        self.config.model = model;
        self
    }
    pub fn associator(mut self, params: AssociatorParams) -> Self {
        self.config.associator = params;
        self
    }
    pub fn search(mut self, params: SearchParams) -> Self {
        self.config.search = params;
        self
    }
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.config.mode = mode;
        self
    }
    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.config.filter.authors = authors;
        self
    }
    pub fn whitelist(mut self, whitelist: Option<StreamWhitelist>) -> Self {
        self.config.filter.whitelist = whitelist;
        self
    }

    /// Inclusive arrival-time range; either bound may be open.
    pub fn time_range(mut self, start: Option<Epoch>, end: Option<Epoch>) -> Self {
        self.config.filter.time_range = match (start, end) {
            (None, None) => None,
            (start, end) => Some((
                start.unwrap_or(Epoch::from_unix_seconds(0.0)),
                end.unwrap_or(Epoch::from_unix_seconds(f64::from(u32::MAX))),
            )),
        };
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * the velocity model satisfies `0 < vs < vp`, `depth_correction >= 0`,
    /// * the start time is not after the end time,
    /// * the playback speed is strictly positive,
    /// * the warm-start box is not wider than the search volume.
    ///
    /// Return
    /// ----------
    /// * The configuration, or [`OctolocError::InvalidConfiguration`].
    pub fn build(self) -> Result<LocatorConfig, OctolocError> {
        let c = &self.config;
        ConstantVelocityModel::new(c.model.vp, c.model.vs, c.model.depth_correction)?;

        if let Some((start, end)) = c.filter.time_range {
            if start > end {
                return Err(OctolocError::InvalidConfiguration(
                    "start time is after end time".into(),
                ));
            }
        }
        if let RunMode::Playback(options) = &c.mode {
            if !(options.speed > 0.0) {
                return Err(OctolocError::InvalidConfiguration(
                    "playback speed must be > 0".into(),
                ));
            }
        }
        if c.associator.warm_start_radius > c.volume.max_distance() {
            return Err(OctolocError::InvalidConfiguration(
                "warm_start_radius exceeds max_distance".into(),
            ));
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;
    use crate::{scheduler::PlaybackOptions, time::parse_time};

    fn volume() -> SearchVolume {
        SearchVolume::new(46.0, 8.0, 200.0, 0.0, 40.0).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = LocatorConfig::builder(volume()).build().unwrap();
        assert_eq!(config.mode, RunMode::Offline);
        assert_eq!(config.filter.authors, vec!["scautopick*".to_string()]);
        let text = format!("{config:#}");
        assert!(text.contains("mode: offline"));
        assert!(text.contains("Association Parameters"));
    }

    #[test]
    fn test_reversed_time_range_is_rejected() {
        let start = parse_time("2024-01-02T00:00:00Z").unwrap();
        let end = parse_time("2024-01-01T00:00:00Z").unwrap();
        let result = LocatorConfig::builder(volume())
            .time_range(Some(start), Some(end))
            .build();
        assert!(matches!(result, Err(OctolocError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_open_time_range() {
        let start = parse_time("2024-01-01T00:00:00Z").unwrap();
        let config = LocatorConfig::builder(volume())
            .time_range(Some(start), None)
            .build()
            .unwrap();
        let (lo, hi) = config.filter.time_range.unwrap();
        assert_eq!(lo, start);
        assert!(hi > start);

        let config = LocatorConfig::builder(volume())
            .time_range(None, None)
            .build()
            .unwrap();
        assert!(config.filter.time_range.is_none());
    }

    #[test]
    fn test_invalid_model_and_speed() {
        let model = ConstantVelocityModel {
            vp: 3.0,
            vs: 4.0,
            depth_correction: 0.0,
        };
        assert!(LocatorConfig::builder(volume())
            .velocity_model(model)
            .build()
            .is_err());

        let mode = RunMode::Playback(PlaybackOptions {
            speed: -1.0,
            ..PlaybackOptions::default()
        });
        assert!(LocatorConfig::builder(volume()).mode(mode).build().is_err());
    }
}
