//! Outlet profile: the single record describing this deployment's shop.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(alias = "taxRate")]
    pub tax_rate: f64,
}

impl Default for OutletProfile {
    fn default() -> Self {
        Self {
            id: "demo-outlet".into(),
            name: "Demo Outlet".into(),
            address: "Demo address".into(),
            phone: "9999999999".into(),
            tax_rate: 5.0,
        }
    }
}

/// Settings-save payload. `tax_rate` stays untyped so form input such as
/// `"12.5"` can be accepted or rejected per field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutletPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "taxRate")]
    pub tax_rate: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutletMerge {
    pub profile: OutletProfile,
    /// Fields whose new value was refused; their prior value was kept.
    pub rejected: Vec<&'static str>,
}

impl OutletPatch {
    pub fn merge_into(&self, current: &OutletProfile) -> OutletMerge {
        let mut profile = current.clone();
        let mut rejected = Vec::new();

        if let Some(name) = &self.name {
            profile.name = name.trim().to_string();
        }
        if let Some(address) = &self.address {
            profile.address = address.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            profile.phone = phone.trim().to_string();
        }
        if let Some(raw) = &self.tax_rate {
            match parse_tax_rate(raw) {
                Some(rate) => profile.tax_rate = rate,
                None => {
                    warn!(value = %raw, "Rejected tax rate update, keeping {}", current.tax_rate);
                    rejected.push("tax_rate");
                }
            }
        }

        OutletMerge { profile, rejected }
    }
}

/// A JSON number or numeric string that is finite and non-negative.
pub fn parse_tax_rate(raw: &Value) -> Option<f64> {
    let rate = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (rate.is_finite() && rate >= 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let patch = OutletPatch {
            name: Some("Pahadi Momos".into()),
            ..Default::default()
        };
        let merged = patch.merge_into(&OutletProfile::default());
        assert_eq!(merged.profile.name, "Pahadi Momos");
        assert_eq!(merged.profile.phone, "9999999999");
        assert_eq!(merged.profile.tax_rate, 5.0);
        assert!(merged.rejected.is_empty());
    }

    #[test]
    fn test_tax_rate_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_tax_rate(&json!(18)), Some(18.0));
        assert_eq!(parse_tax_rate(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(parse_tax_rate(&json!(0)), Some(0.0));
        assert_eq!(parse_tax_rate(&json!(-1)), None);
        assert_eq!(parse_tax_rate(&json!("abc")), None);
        assert_eq!(parse_tax_rate(&json!(null)), None);
    }

    #[test]
    fn test_invalid_tax_rate_is_rejected_without_blocking_other_fields() {
        let patch: OutletPatch = serde_json::from_value(json!({
            "address": "Mall Road",
            "taxRate": "-3"
        }))
        .unwrap();
        let merged = patch.merge_into(&OutletProfile::default());
        assert_eq!(merged.profile.address, "Mall Road");
        assert_eq!(merged.profile.tax_rate, 5.0);
        assert_eq!(merged.rejected, vec!["tax_rate"]);
    }
}
