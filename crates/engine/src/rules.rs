//! The closed rule (event) catalog.
//!
//! Three triggers exist: a pub entering a stage, a pub leaving a stage, and a
//! pub staying in a stage for at least a configured duration. The first two
//! fire synchronously from a move; the third is evaluated by the scheduler.

use std::sync::OnceLock;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use schemas::{CoreSchemaType, ObjectSchema};

/// A name that is not in the rule catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown event kind: '{0}'")]
pub struct UnknownEventKind(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    PubEnteredStage,
    PubLeftStage,
    PubInStageForDuration,
}

impl Event {
    pub const ALL: [Event; 3] = [
        Self::PubEnteredStage,
        Self::PubLeftStage,
        Self::PubInStageForDuration,
    ];

    /// Wire name stored in `rule_bindings.event`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PubEnteredStage => "pubEnteredStage",
            Self::PubLeftStage => "pubLeftStage",
            Self::PubInStageForDuration => "pubInStageForDuration",
        }
    }

    pub fn descriptor(&self) -> &'static RuleDescriptor {
        &rule_registry()[*self as usize]
    }

    /// Phrase describing when the rule fires, e.g. "a pub enters this stage".
    /// A config that does not parse falls back to the base phrase.
    pub fn render(&self, config: Option<&Value>) -> String {
        match self {
            Self::PubEnteredStage | Self::PubLeftStage => self.descriptor().base.to_owned(),
            Self::PubInStageForDuration => match config.map(DurationConfig::from_value) {
                Some(Ok(duration)) => format!("a pub stays in this stage for {duration}"),
                _ => self.descriptor().base.to_owned(),
            },
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Event {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

/// "`<instance>` will run when `<phrase>`".
pub fn describe_binding(instance_name: &str, event: Event, config: Option<&Value>) -> String {
    format!("{instance_name} will run when {}", event.render(config))
}

// ---------------------------------------------------------------------------
// Duration config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationInterval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DurationInterval {
    pub const ALL: [DurationInterval; 6] = [
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    fn minutes(&self) -> i64 {
        match self {
            Self::Minute => 1,
            Self::Hour => 60,
            Self::Day => 60 * 24,
            Self::Week => 60 * 24 * 7,
            // Calendar-free approximations.
            Self::Month => 60 * 24 * 30,
            Self::Year => 60 * 24 * 365,
        }
    }
}

/// Largest accepted `duration`, in whatever interval the binding uses.
pub const MAX_DURATION: u32 = 10_000;

/// `additionalConfig` of a `pubInStageForDuration` binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationConfig {
    pub duration: u32,
    pub interval: DurationInterval,
}

impl DurationConfig {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// The threshold an occupancy must reach before the rule fires, or
    /// `None` if it does not fit in a [`Duration`].
    pub fn threshold(&self) -> Option<Duration> {
        i64::from(self.duration)
            .checked_mul(self.interval.minutes())
            .and_then(Duration::try_minutes)
    }
}

impl std::fmt::Display for DurationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = self.interval.as_str();
        if self.duration == 1 {
            write!(f, "1 {unit}")
        } else {
            write!(f, "{} {unit}s", self.duration)
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Static description of one rule kind.
#[derive(Debug, Clone, Serialize)]
pub struct RuleDescriptor {
    pub event: Event,
    /// Rendering used when no config is available.
    pub base: &'static str,
    /// Schema for `additionalConfig`; `None` means the event takes none.
    pub additional_config_schema: Option<Value>,
}

fn duration_schema() -> Value {
    ObjectSchema::new()
        .required("duration", CoreSchemaType::Number, "How many intervals")
        .integer()
        .minimum(1.0)
        .maximum(f64::from(MAX_DURATION))
        .required("interval", CoreSchemaType::String, "Unit of the duration")
        .one_of(DurationInterval::ALL.map(|i| json!(i.as_str())))
        .build()
}

/// The registration table, indexed in [`Event::ALL`] order.
pub fn rule_registry() -> &'static [RuleDescriptor] {
    static REGISTRY: OnceLock<Vec<RuleDescriptor>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Event::ALL
            .into_iter()
            .map(|event| match event {
                Event::PubEnteredStage => RuleDescriptor {
                    event,
                    base: "a pub enters this stage",
                    additional_config_schema: None,
                },
                Event::PubLeftStage => RuleDescriptor {
                    event,
                    base: "a pub leaves this stage",
                    additional_config_schema: None,
                },
                Event::PubInStageForDuration => RuleDescriptor {
                    event,
                    base: "a pub stays in this stage for a set duration",
                    additional_config_schema: Some(duration_schema()),
                },
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for event in Event::ALL {
            assert_eq!(event.as_str().parse::<Event>().unwrap(), event);
            assert_eq!(serde_json::to_value(event).unwrap(), event.as_str());
        }
        assert_eq!(
            "pubArchived".parse::<Event>().unwrap_err(),
            UnknownEventKind("pubArchived".into())
        );
    }

    #[test]
    fn renders_duration_with_units() {
        let config = json!({ "duration": 3, "interval": "day" });
        assert_eq!(
            describe_binding("Remind reviewers", Event::PubInStageForDuration, Some(&config)),
            "Remind reviewers will run when a pub stays in this stage for 3 days"
        );
        assert_eq!(
            Event::PubInStageForDuration.render(Some(&json!({ "duration": 1, "interval": "week" }))),
            "a pub stays in this stage for 1 week"
        );
        assert_eq!(
            Event::PubEnteredStage.render(None),
            "a pub enters this stage"
        );
    }

    #[test]
    fn thresholds_use_fixed_length_months_and_years() {
        let month = DurationConfig { duration: 1, interval: DurationInterval::Month };
        let year = DurationConfig { duration: 2, interval: DurationInterval::Year };
        assert_eq!(month.threshold(), Some(Duration::days(30)));
        assert_eq!(year.threshold(), Some(Duration::days(730)));

        let huge = DurationConfig { duration: u32::MAX, interval: DurationInterval::Year };
        assert_eq!(huge.threshold(), None);
    }

    #[test]
    fn duration_schema_rejects_zero_and_unknown_units() {
        let schema = Event::PubInStageForDuration
            .descriptor()
            .additional_config_schema
            .clone()
            .unwrap();
        let ok = json!({ "duration": 24, "interval": "hour" });
        assert!(schemas::validate(&schema, &ok).unwrap().is_valid());
        let zero = json!({ "duration": 0, "interval": "hour" });
        assert!(!schemas::validate(&schema, &zero).unwrap().is_valid());
        let fortnight = json!({ "duration": 1, "interval": "fortnight" });
        assert!(!schemas::validate(&schema, &fortnight).unwrap().is_valid());
        let fractional = json!({ "duration": 1.5, "interval": "hour" });
        assert!(!schemas::validate(&schema, &fractional).unwrap().is_valid());
        let far_future = json!({ "duration": 1_000_000, "interval": "year" });
        assert!(!schemas::validate(&schema, &far_future).unwrap().is_valid());
    }
}
