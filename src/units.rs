//! Unit-aware literal parsing and conversion for condition comparisons.
//! A condition literal such as `80F` or `25mph` carries an optional unit
//! suffix; the evaluator converts the sensor's canonical-unit value into
//! that unit before comparing, per spec §4.3.

use std::str::FromStr;

use crate::error::ConditionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Fahrenheit,
    Celsius,
    Mph,
    MetersPerSecond,
}

impl Unit {
    fn parse(s: &str) -> Option<Unit> {
        match s.to_ascii_lowercase().as_str() {
            "f" => Some(Unit::Fahrenheit),
            "c" => Some(Unit::Celsius),
            "mph" => Some(Unit::Mph),
            "m/s" | "ms" => Some(Unit::MetersPerSecond),
            _ => None,
        }
    }

    /// Which physical quantity this unit measures, used to reject e.g.
    /// `humidity > 10mph`.
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Fahrenheit | Unit::Celsius => Dimension::Temperature,
            Unit::Mph | Unit::MetersPerSecond => Dimension::Speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Temperature,
    Speed,
}

/// A parsed literal: a bare number, optionally followed by a unit suffix.
#[derive(Debug, Clone, Copy)]
pub struct NumberUnit {
    pub value: f64,
    pub unit: Option<Unit>,
}

impl FromStr for NumberUnit {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split_at = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (num_part, unit_part) = s.split_at(split_at);
        let value: f64 = num_part
            .parse()
            .map_err(|_| ConditionError::MalformedLiteral(s.to_string()))?;
        let unit = if unit_part.trim().is_empty() {
            None
        } else {
            Some(
                Unit::parse(unit_part.trim())
                    .ok_or_else(|| ConditionError::MalformedLiteral(s.to_string()))?,
            )
        };
        Ok(NumberUnit { value, unit })
    }
}

/// Convert a Celsius value into Fahrenheit.
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Convert a Fahrenheit value into Celsius.
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert meters-per-second into miles-per-hour.
pub fn ms_to_mph(ms: f64) -> f64 {
    ms * 2.2369362921
}

/// Convert miles-per-hour into meters-per-second.
pub fn mph_to_ms(mph: f64) -> f64 {
    mph / 2.2369362921
}

/// Convert `sensor_value` (stored in `from_dimension`'s canonical unit,
/// i.e. Celsius or m/s) into `unit`. Returns an error if `unit`'s dimension
/// does not match the field's dimension.
pub fn convert_to(
    sensor_value: f64,
    field_dimension: Dimension,
    unit: Unit,
    field_name: &str,
) -> Result<f64, ConditionError> {
    if unit.dimension() != field_dimension {
        return Err(ConditionError::IncompatibleUnit {
            field: field_name.to_string(),
            unit: format!("{:?}", unit),
        });
    }
    Ok(match unit {
        Unit::Fahrenheit => celsius_to_fahrenheit(sensor_value),
        Unit::Celsius => sensor_value,
        Unit::Mph => ms_to_mph(sensor_value),
        Unit::MetersPerSecond => sensor_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_number() {
        let lit: NumberUnit = "80".parse().unwrap();
        assert_eq!(lit.value, 80.0);
        assert!(lit.unit.is_none());
    }

    #[test]
    fn parses_unit_suffix_case_insensitive() {
        let lit: NumberUnit = "80F".parse().unwrap();
        assert_eq!(lit.value, 80.0);
        assert_eq!(lit.unit, Some(Unit::Fahrenheit));
        let lit: NumberUnit = "25mph".parse().unwrap();
        assert_eq!(lit.unit, Some(Unit::Mph));
        let lit: NumberUnit = "11M/S".parse().unwrap();
        assert_eq!(lit.unit, Some(Unit::MetersPerSecond));
    }

    #[test]
    fn p5_temperature_conversion() {
        // 27.0C ~= 80.6F
        let f = celsius_to_fahrenheit(27.0);
        assert!((f - 80.6).abs() < 0.05);
        assert!(f > 80.0);
    }

    #[test]
    fn p5_wind_conversion() {
        assert!(ms_to_mph(11.0) < 25.0);
        assert!(ms_to_mph(11.3) > 25.0);
    }

    #[test]
    fn rejects_incompatible_unit() {
        let err = convert_to(50.0, Dimension::Temperature, Unit::Mph, "temperature");
        assert!(err.is_err());
    }
}
