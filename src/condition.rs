//! L5: ConditionEvaluator. Compiles and evaluates alarm condition strings
//! against an `Observation`, per spec §4.3.
//!
//! Grammar (C-like precedence: `&&` binds tighter than `||`, resolving
//! Open Question #1 in the spec's favor of the standard convention):
//!
//! ```text
//! expr := conj ("||" conj)*
//! conj := cmp ("&&" cmp)*
//! cmp  := field cmpop literal | changeop field
//! ```

use std::collections::HashMap;

use crate::error::ConditionError;
use crate::observation::Observation;
use crate::units::{self, Dimension, NumberUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    WindGust,
    WindDirection,
    RainRate,
    RainDaily,
    Lux,
    Uv,
    LightningCount,
    LightningDistance,
}

impl Field {
    fn parse(name: &str) -> Option<Field> {
        match name.to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Some(Field::Temperature),
            "humidity" => Some(Field::Humidity),
            "pressure" => Some(Field::Pressure),
            "wind_speed" | "wind" => Some(Field::WindSpeed),
            "wind_gust" => Some(Field::WindGust),
            "wind_direction" => Some(Field::WindDirection),
            "rain_rate" => Some(Field::RainRate),
            "rain_daily" => Some(Field::RainDaily),
            "lux" => Some(Field::Lux),
            "uv" => Some(Field::Uv),
            "lightning_count" => Some(Field::LightningCount),
            "lightning_distance" => Some(Field::LightningDistance),
            _ => None,
        }
    }

    pub fn dimension(self) -> Option<Dimension> {
        match self {
            Field::Temperature => Some(Dimension::Temperature),
            Field::WindSpeed | Field::WindGust => Some(Dimension::Speed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::Pressure => "pressure",
            Field::WindSpeed => "wind_speed",
            Field::WindGust => "wind_gust",
            Field::WindDirection => "wind_direction",
            Field::RainRate => "rain_rate",
            Field::RainDaily => "rain_daily",
            Field::Lux => "lux",
            Field::Uv => "uv",
            Field::LightningCount => "lightning_count",
            Field::LightningDistance => "lightning_distance",
        }
    }

    pub fn value(self, obs: &Observation) -> f64 {
        match self {
            Field::Temperature => obs.temperature_c,
            Field::Humidity => obs.relative_humidity_pct,
            Field::Pressure => obs.station_pressure_mb,
            Field::WindSpeed => obs.wind_avg_ms,
            Field::WindGust => obs.wind_gust_ms,
            Field::WindDirection => obs.wind_direction_deg,
            Field::RainRate => obs.rain_rate_mm,
            Field::RainDaily => obs.rain_daily_mm,
            Field::Lux => obs.illuminance_lux,
            Field::Uv => obs.uv_index as f64,
            Field::LightningCount => obs.lightning_strike_count as f64,
            Field::LightningDistance => obs.lightning_avg_distance_km,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeOp {
    Any,
    Increase,
    Decrease,
}

#[derive(Debug, Clone)]
enum Cmp {
    Compare {
        field_name: String,
        op: CmpOp,
        literal: NumberUnit,
    },
    Change {
        field_name: String,
        op: ChangeOp,
    },
}

#[derive(Debug, Clone)]
pub struct CompiledCondition {
    // Outer Vec is OR'd together; inner Vec is AND'd together.
    disjuncts: Vec<Vec<Cmp>>,
}

fn tokenize(input: &str) -> Vec<String> {
    // Insert spaces around operators so a simple whitespace split works,
    // without pulling in a combinator crate for a grammar this small.
    let mut spaced = String::with_capacity(input.len() * 2);
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' | '|' => {
                if chars.peek() == Some(&c) {
                    chars.next();
                    spaced.push(' ');
                    spaced.push(c);
                    spaced.push(c);
                    spaced.push(' ');
                } else {
                    spaced.push(c);
                }
            }
            '>' | '<' | '=' | '!' | '*' => {
                spaced.push(' ');
                spaced.push(c);
                if chars.peek() == Some(&'=') {
                    spaced.push('=');
                    chars.next();
                }
                spaced.push(' ');
            }
            '(' | ')' => {
                spaced.push(' ');
                spaced.push(c);
                spaced.push(' ');
            }
            _ => spaced.push(c),
        }
    }
    spaced.split_whitespace().map(|s| s.to_string()).collect()
}

/// Compile a condition string into a `CompiledCondition`. Parentheses are
/// accepted only to group a single `conj` (disambiguation aid); nested
/// grouping beyond top-level `||` of `&&`-chains is rejected as a syntax
/// error with a message naming the chosen precedence, per spec §4.3 /
/// Open Question #1.
pub fn compile(condition: &str) -> Result<CompiledCondition, ConditionError> {
    let tokens = tokenize(condition);
    if tokens.is_empty() {
        return Err(ConditionError::Syntax {
            detail: "empty condition".to_string(),
        });
    }
    let or_groups: Vec<&[String]> = split_on(&tokens, "||");
    let mut disjuncts = Vec::with_capacity(or_groups.len());
    for group in or_groups {
        let and_groups = split_on(group, "&&");
        let mut conj = Vec::with_capacity(and_groups.len());
        for cmp_tokens in and_groups {
            conj.push(parse_cmp(cmp_tokens)?);
        }
        disjuncts.push(conj);
    }
    Ok(CompiledCondition { disjuncts })
}

fn split_on<'a>(tokens: &'a [String], sep: &str) -> Vec<&'a [String]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t == sep {
            groups.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    groups.push(&tokens[start..]);
    groups
}

fn parse_cmp(tokens: &[String]) -> Result<Cmp, ConditionError> {
    let tokens: Vec<&str> = tokens
        .iter()
        .map(|s| s.as_str())
        .filter(|s| *s != "(" && *s != ")")
        .collect();

    if tokens.is_empty() {
        return Err(ConditionError::Syntax {
            detail: "empty comparison".to_string(),
        });
    }

    // Change-detection form: *field | >field | <field
    if matches!(tokens[0], "*" | ">" | "<") && tokens.len() == 2 {
        let op = match tokens[0] {
            "*" => ChangeOp::Any,
            ">" => ChangeOp::Increase,
            "<" => ChangeOp::Decrease,
            _ => unreachable!(),
        };
        // Field names are resolved at evaluation time, not here: an unknown
        // field is a per-alarm, per-observation ConditionEval failure (spec
        // §4.3/§7), not a reason to reject the whole config at load time.
        return Ok(Cmp::Change {
            field_name: tokens[1].to_string(),
            op,
        });
    }

    if tokens.len() != 3 {
        return Err(ConditionError::Syntax {
            detail: format!("expected 'field op value', got '{}'", tokens.join(" ")),
        });
    }

    let field_name = tokens[0].to_string();
    let op = match tokens[1] {
        ">" => CmpOp::Gt,
        ">=" => CmpOp::Ge,
        "<" => CmpOp::Lt,
        "<=" => CmpOp::Le,
        "==" => CmpOp::Eq,
        "!=" => CmpOp::Ne,
        other => return Err(ConditionError::UnknownOperator(other.to_string())),
    };
    let literal: NumberUnit = tokens[2]
        .parse()
        .map_err(|_| ConditionError::MalformedLiteral(tokens[2].to_string()))?;

    Ok(Cmp::Compare {
        field_name,
        op,
        literal,
    })
}

/// Per-field evaluation state the `AlarmManager` carries across
/// observations: the previous reading (change-detection baseline) and the
/// trigger context captured at the moment a change-operator fired.
#[derive(Debug, Default, Clone)]
pub struct EvalState {
    pub previous_value: HashMap<Field, f64>,
    pub trigger_context: HashMap<Field, f64>,
}

pub struct EvalOutcome {
    pub triggered: bool,
    pub fields_read: Vec<Field>,
}

impl CompiledCondition {
    /// Evaluate against `obs`, mutating `state.previous_value`/
    /// `trigger_context` per spec §4.3's change-detection rules. Trigger
    /// context for a field is captured *before* `previous_value` is
    /// updated to the new reading (Open Question #3 / the repaired
    /// ordering bug) so templates can still show the "before" value.
    pub fn evaluate(
        &self,
        obs: &Observation,
        state: &mut EvalState,
    ) -> Result<EvalOutcome, ConditionError> {
        let mut fields_read = Vec::new();
        let mut any_true = false;

        for conj in &self.disjuncts {
            let mut all_true = true;
            for cmp in conj {
                let result = eval_cmp(cmp, obs, state, &mut fields_read)?;
                if !result {
                    all_true = false;
                }
            }
            if all_true {
                any_true = true;
            }
        }

        Ok(EvalOutcome {
            triggered: any_true,
            fields_read,
        })
    }
}

fn eval_cmp(
    cmp: &Cmp,
    obs: &Observation,
    state: &mut EvalState,
    fields_read: &mut Vec<Field>,
) -> Result<bool, ConditionError> {
    match cmp {
        Cmp::Compare {
            field_name,
            op,
            literal,
        } => {
            let field = Field::parse(field_name)
                .ok_or_else(|| ConditionError::UnknownField(field_name.clone()))?;
            fields_read.push(field);
            let current = field.value(obs);
            let compare_against = match literal.unit {
                Some(unit) => {
                    let dim = field.dimension().ok_or_else(|| ConditionError::IncompatibleUnit {
                        field: field.name().to_string(),
                        unit: format!("{:?}", unit),
                    })?;
                    units::convert_to(current, dim, unit, field.name())?
                }
                None => current,
            };
            let triggered = match op {
                CmpOp::Gt => compare_against > literal.value,
                CmpOp::Ge => compare_against >= literal.value,
                CmpOp::Lt => compare_against < literal.value,
                CmpOp::Le => compare_against <= literal.value,
                CmpOp::Eq => (compare_against - literal.value).abs() < f64::EPSILON,
                CmpOp::Ne => (compare_against - literal.value).abs() >= f64::EPSILON,
            };
            // Comparison operators don't have a "before" value to capture as
            // trigger context (there's no transition, just a threshold), but
            // previous_value is still updated for every field read so
            // {{last_*}} template variables have something to fall back to.
            state.previous_value.insert(field, current);
            Ok(triggered)
        }
        Cmp::Change { field_name, op } => {
            let field = Field::parse(field_name)
                .ok_or_else(|| ConditionError::UnknownField(field_name.clone()))?;
            fields_read.push(field);
            let current = field.value(obs);
            let previous = state.previous_value.get(&field).copied();
            let triggered = match previous {
                None => false,
                Some(prev) => match op {
                    ChangeOp::Any => prev != current,
                    ChangeOp::Increase => current > prev,
                    ChangeOp::Decrease => current < prev,
                },
            };
            if triggered {
                if let Some(prev) = previous {
                    state.trigger_context.insert(field, prev);
                }
            }
            state.previous_value.insert(field, current);
            Ok(triggered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs_with(lux: f64) -> Observation {
        let mut o = Observation::at(0);
        o.illuminance_lux = lux;
        o
    }

    #[test]
    fn p4_change_detection_baseline_then_trigger() {
        let cond = compile("*lux").unwrap();
        let mut state = EvalState::default();

        let first = cond.evaluate(&obs_with(100.0), &mut state).unwrap();
        assert!(!first.triggered);
        assert!(state.trigger_context.is_empty());
        assert_eq!(state.previous_value[&Field::Lux], 100.0);

        let second = cond.evaluate(&obs_with(250.0), &mut state).unwrap();
        assert!(second.triggered);
        assert_eq!(state.trigger_context[&Field::Lux], 100.0);
        assert_eq!(state.previous_value[&Field::Lux], 250.0);
    }

    #[test]
    fn comparison_also_updates_previous_value() {
        // A compare op has no "before" transition to record as trigger
        // context, but previous_value must still be set so {{last_*}}
        // template variables have a fallback for comparison-based alarms.
        let cond = compile("temperature > 20").unwrap();
        let mut state = EvalState::default();
        let mut obs = Observation::at(0);
        obs.temperature_c = 25.0;
        let outcome = cond.evaluate(&obs, &mut state).unwrap();
        assert!(outcome.triggered);
        assert!(state.trigger_context.is_empty());
        assert_eq!(state.previous_value[&Field::Temperature], 25.0);
    }

    #[test]
    fn p5_unit_aware_comparison() {
        let cond = compile("temperature > 80F").unwrap();
        let mut state = EvalState::default();
        let mut obs = Observation::at(0);
        obs.temperature_c = 27.0;
        let outcome = cond.evaluate(&obs, &mut state).unwrap();
        assert!(outcome.triggered);
    }

    #[test]
    fn p5_wind_gust_unit_conversion() {
        let cond = compile("wind_gust > 25mph").unwrap();
        let mut state = EvalState::default();

        let mut low = Observation::at(0);
        low.wind_gust_ms = 11.0;
        assert!(!cond.evaluate(&low, &mut state).unwrap().triggered);

        let mut high = Observation::at(0);
        high.wind_gust_ms = 11.3;
        assert!(cond.evaluate(&high, &mut state).unwrap().triggered);
    }

    #[test]
    fn and_or_precedence() {
        // && binds tighter: "a || b && c" == "a || (b && c)"
        let cond = compile("humidity > 1000 || temperature > 0 && temperature < 100").unwrap();
        let mut state = EvalState::default();
        let mut obs = Observation::at(0);
        obs.temperature_c = 50.0;
        obs.relative_humidity_pct = 10.0;
        assert!(cond.evaluate(&obs, &mut state).unwrap().triggered);
    }

    #[test]
    fn unknown_field_is_an_error() {
        let cond = compile("frobnicate > 1").unwrap();
        let mut state = EvalState::default();
        assert!(cond.evaluate(&Observation::at(0), &mut state).is_err());
    }

    #[test]
    fn incompatible_unit_is_an_error() {
        let cond = compile("humidity > 10mph").unwrap();
        let mut state = EvalState::default();
        assert!(cond.evaluate(&Observation::at(0), &mut state).is_err());
    }
}
