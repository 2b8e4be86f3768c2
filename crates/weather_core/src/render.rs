//! The rendering collaborator seam and the in-process weather board.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RegionId, WeatherId};

/// Whatever shows weather to players. Called on every due tick, changed or
/// not, so the renderer's own shutdown timer keeps getting pushed back.
pub trait WeatherRenderer {
    fn set_weather(&mut self, region: &RegionId, weather: Option<&WeatherId>, expires_at: Duration);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedWeather {
    pub weather: Option<WeatherId>,
    pub expires_at: Duration,
    pub refreshed: u64,
}

/// Tracks the weather each region is showing and when it lapses.
///
/// A region whose expiry passes without a refresh reads as clear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherBoard {
    applied: HashMap<RegionId, AppliedWeather>,
}

impl WeatherBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weather visible in `region` at `now`.
    pub fn visible(&self, region: &RegionId, now: Duration) -> Option<&WeatherId> {
        self.applied
            .get(region)
            .filter(|applied| now <= applied.expires_at)
            .and_then(|applied| applied.weather.as_ref())
    }

    pub fn applied(&self, region: &RegionId) -> Option<&AppliedWeather> {
        self.applied.get(region)
    }

    /// Visible weather for every known region, sorted by region id.
    pub fn visible_all(&self, now: Duration) -> Vec<(RegionId, Option<WeatherId>)> {
        let mut rows: Vec<(RegionId, Option<WeatherId>)> = self
            .applied
            .keys()
            .map(|region| (region.clone(), self.visible(region, now).cloned()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn forget(&mut self, region: &RegionId) {
        self.applied.remove(region);
    }
}

impl WeatherRenderer for WeatherBoard {
    fn set_weather(
        &mut self,
        region: &RegionId,
        weather: Option<&WeatherId>,
        expires_at: Duration,
    ) {
        let entry = self
            .applied
            .entry(region.clone())
            .or_insert_with(|| AppliedWeather {
                weather: None,
                expires_at,
                refreshed: 0,
            });
        entry.weather = weather.cloned();
        entry.expires_at = expires_at;
        entry.refreshed += 1;
    }
}
