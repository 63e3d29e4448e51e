use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Energy quantities in kWh unless a field name says otherwise.
pub type Energy = Decimal;

/// A metric that may legitimately have no value (an IRR on a series with no
/// sign change, a payback that never happens, DSCR without debt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValue {
    Defined(Decimal),
    Undefined,
}

impl MetricValue {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }
}

impl From<Option<Decimal>> for MetricValue {
    fn from(v: Option<Decimal>) -> Self {
        match v {
            Some(d) => MetricValue::Defined(d),
            None => MetricValue::Undefined,
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Defined(v) => Serialize::serialize(v, serializer),
            MetricValue::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Value(Decimal),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Value(v) => Ok(MetricValue::Defined(v)),
            Raw::Text(t) if t == "undefined" => Ok(MetricValue::Undefined),
            Raw::Text(t) => Err(D::Error::custom(format!("unexpected metric value '{t}'"))),
        }
    }
}

/// A variable to sweep: field path and range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariable {
    /// Dotted path into the assumptions document (e.g. "ppa.base_price_per_mwh")
    pub name: String,
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

/// Scenario definition: a named JSON merge-patch over the base assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub overrides: serde_json::Value,
}

/// Warnings and defaults collected during a run. Returned to the caller
/// alongside the result instead of living in process-wide state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    pub warnings: Vec<String>,
    pub defaults_applied: Vec<String>,
}

impl AuditTrail {
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn default_applied(&mut self, path: &str, value: impl std::fmt::Display) {
        log::debug!("default applied: {path} = {value}");
        self.defaults_applied.push(format!("{path} = {value}"));
    }

    /// Resolve an optional input, recording the default when it is used.
    pub fn resolve<T: Copy + std::fmt::Display>(
        &mut self,
        path: &str,
        value: Option<T>,
        default: T,
    ) -> T {
        match value {
            Some(v) => v,
            None => {
                self.default_applied(path, default);
                default
            }
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub defaults_applied: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    audit: AuditTrail,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings: audit.warnings,
        defaults_applied: audit.defaults_applied,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_metric_value_serializes_undefined_as_string() {
        let json = serde_json::to_value(MetricValue::Undefined).unwrap();
        assert_eq!(json, serde_json::json!("undefined"));

        let back: MetricValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, MetricValue::Undefined);
    }

    #[test]
    fn test_metric_value_defined_round_trips() {
        let json = serde_json::to_value(MetricValue::Defined(dec!(0.0825))).unwrap();
        let back: MetricValue = serde_json::from_value(json).unwrap();
        assert_eq!(back.value(), Some(dec!(0.0825)));
    }

    #[test]
    fn test_audit_resolve_records_default() {
        let mut audit = AuditTrail::default();
        let v = audit.resolve("sizing.availability", None, dec!(0.98));
        assert_eq!(v, dec!(0.98));
        assert_eq!(audit.defaults_applied, vec!["sizing.availability = 0.98"]);

        let v = audit.resolve("sizing.availability", Some(dec!(0.99)), dec!(0.98));
        assert_eq!(v, dec!(0.99));
        assert_eq!(audit.defaults_applied.len(), 1);
    }
}
