//! Evaluation weights: the informe/empleador split used by the grade engine.
//!
//! A [`WeightConfig`] can only be built through its validating constructor,
//! so any value in hand satisfies `informe + empleador == 100`. The
//! [`WeightRegistry`] replaces the whole pair at once; it never edits one
//! side in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use practicas_state::{WeightRecord, WeightSnapshot, WeightStore};

use crate::clock::Clock;
use crate::domain::{ActorContext, CoreError, CoreResult};
use crate::obs;

/// A validated weight pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightConfig {
    informe_weight: u8,
    empleador_weight: u8,
    /// 0 for the built-in default, otherwise the store-assigned version.
    version: u64,
}

impl WeightConfig {
    /// Validate a pair. Both must lie in [0, 100] and sum to exactly 100.
    pub fn new(informe: u32, empleador: u32) -> CoreResult<Self> {
        if informe > 100 || empleador > 100 || informe + empleador != 100 {
            return Err(CoreError::WeightSumInvalid { informe, empleador });
        }
        Ok(Self {
            informe_weight: informe as u8,
            empleador_weight: empleador as u8,
            version: 0,
        })
    }

    pub fn informe_weight(&self) -> u8 {
        self.informe_weight
    }

    pub fn empleador_weight(&self) -> u8 {
        self.empleador_weight
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot {
            informe_weight: self.informe_weight,
            empleador_weight: self.empleador_weight,
            version: self.version,
        }
    }

    fn from_record(record: &WeightRecord) -> CoreResult<Self> {
        let mut config = Self::new(
            u32::from(record.informe_weight),
            u32::from(record.empleador_weight),
        )?;
        config.version = record.version;
        Ok(config)
    }
}

impl Default for WeightConfig {
    /// 60% informe, 40% empleador.
    fn default() -> Self {
        Self {
            informe_weight: 60,
            empleador_weight: 40,
            version: 0,
        }
    }
}

/// Single source of truth for the active weights.
pub struct WeightRegistry {
    store: Arc<dyn WeightStore>,
    clock: Arc<dyn Clock>,
    fallback: WeightConfig,
}

impl WeightRegistry {
    pub fn new(store: Arc<dyn WeightStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_fallback(store, clock, WeightConfig::default())
    }

    /// Use `fallback` instead of 60/40 while nothing has been stored.
    pub fn with_fallback(
        store: Arc<dyn WeightStore>,
        clock: Arc<dyn Clock>,
        fallback: WeightConfig,
    ) -> Self {
        Self {
            store,
            clock,
            fallback,
        }
    }

    /// The latest accepted configuration, or the fallback if none was ever set.
    pub async fn current(&self) -> CoreResult<WeightConfig> {
        match self.store.current().await? {
            Some(record) => WeightConfig::from_record(&record),
            None => Ok(self.fallback),
        }
    }

    /// Replace both weights at once. Invalid pairs are rejected before the
    /// store is touched, so `current()` stays unchanged on error.
    pub async fn replace(
        &self,
        informe: u32,
        empleador: u32,
        actor: &ActorContext,
    ) -> CoreResult<WeightConfig> {
        let validated = WeightConfig::new(informe, empleador)?;
        let stored = self
            .store
            .replace(WeightRecord {
                informe_weight: validated.informe_weight,
                empleador_weight: validated.empleador_weight,
                version: 0,
                replaced_at: self.clock.now(),
                replaced_by: actor.actor_id.clone(),
            })
            .await?;
        let config = WeightConfig::from_record(&stored)?;
        obs::emit_weights_replaced(&actor.actor_id, &config);
        Ok(config)
    }

    /// Accepted configurations, newest first.
    pub async fn history(&self) -> CoreResult<Vec<WeightRecord>> {
        Ok(self.store.history().await?)
    }
}
