//! Context rule resolution
//!
//! Turns the estimators' published state into one `AutomaticContext` label.
//! Evaluated once per sampling tick, never per sensor event.
//!
//! Rules, first match wins:
//! 1. fresh GPS and speed ≥ driving threshold → `Driving`
//! 2. fresh GPS, speed ≤ red-light threshold and previous label `Driving` → `RedLight`
//! 3. walking detected → `Walking`
//! 4. GPS stale/absent and accelerometer timed out → `Unknown`
//! 5. otherwise → `Stationary`
//!
//! `RedLight` only follows a `Driving` tick, so it lasts a single tick: a stop
//! that outlasts one sampling period resolves to `Stationary` on the next tick.

use crate::config::ResolverConfig;
use crate::types::{AutomaticContext, SpeedEstimate, WalkingState};
use tracing::debug;

/// Everything the rules look at for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverInput {
    /// Latest speed estimate, `None` before the first fix
    pub speed: Option<SpeedEstimate>,
    /// Whether the last fix is recent enough to trust
    pub gps_fresh: bool,
    pub walking: WalkingState,
    pub accel_timed_out: bool,
}

/// Stateful resolver remembering the previous label.
#[derive(Debug, Clone)]
pub struct ContextRuleResolver {
    config: ResolverConfig,
    previous: AutomaticContext,
}

impl Default for ContextRuleResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl ContextRuleResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            previous: AutomaticContext::Stationary,
        }
    }

    /// Pure rule evaluation against an explicit previous label.
    pub fn resolve(
        config: &ResolverConfig,
        input: &ResolverInput,
        previous: AutomaticContext,
    ) -> AutomaticContext {
        let fresh_speed = input
            .speed
            .filter(|_| input.gps_fresh)
            .map(|s| s.speed_kmh);

        if let Some(speed) = fresh_speed {
            if speed >= config.driving_enter_kmh {
                return AutomaticContext::Driving;
            }
            if speed <= config.red_light_max_kmh && previous == AutomaticContext::Driving {
                return AutomaticContext::RedLight;
            }
        }

        if input.walking.active {
            return AutomaticContext::Walking;
        }

        let gps_missing = fresh_speed.is_none();
        if gps_missing && input.accel_timed_out {
            return AutomaticContext::Unknown;
        }

        AutomaticContext::Stationary
    }

    /// Resolve one tick and remember the result as the previous label.
    pub fn tick(&mut self, input: &ResolverInput) -> AutomaticContext {
        let next = Self::resolve(&self.config, input, self.previous);
        if next != self.previous {
            debug!(from = %self.previous, to = %next, "automatic context changed");
        }
        self.previous = next;
        next
    }

    /// Label resolved at the last tick (held over between ticks)
    pub fn current(&self) -> AutomaticContext {
        self.previous
    }

    /// GPS freshness rule: the last fix is at most `gps_fresh_factor` tick periods old
    pub fn is_gps_fresh(&self, last_fix_ms: Option<i64>, now_ms: i64, tick_period_ms: i64) -> bool {
        let max_age = (tick_period_ms as f64 * self.config.gps_fresh_factor).round() as i64;
        match last_fix_ms {
            Some(t) => now_ms.saturating_sub(t) <= max_age,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.previous = AutomaticContext::Stationary;
    }
}
