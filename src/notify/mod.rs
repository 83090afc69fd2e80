//! L7: NotifierRegistry. Dispatches a triggered alarm's notification to
//! each configured channel, per spec §4.5. Delivery is best-effort per
//! channel — one channel's failure never prevents the others from being
//! attempted — and the shared `{{var}}` template expansion contract lives
//! here since every channel uses it.

pub mod console;
pub mod email;
pub mod eventlog;
pub mod oslog;
pub mod sms;
pub mod syslog;

use std::collections::HashMap;

use log::error;

use crate::alarm::config::{ChannelSpec, EmailSettings, SmsSettings};
use crate::condition::Field;
use crate::observation::Observation;
use crate::units;

pub struct NotifierRegistry {
    email_settings: Option<EmailSettings>,
    sms_settings: Option<SmsSettings>,
}

impl NotifierRegistry {
    pub fn new(email_settings: Option<EmailSettings>, sms_settings: Option<SmsSettings>) -> Self {
        Self {
            email_settings,
            sms_settings,
        }
    }

    /// Deliver a triggered alarm's notification over every channel in
    /// order. Each channel is attempted independently; a failure on one
    /// is logged (at the out-of-band alarm level for visibility) and does
    /// not stop the others (P8).
    pub async fn dispatch(
        &self,
        alarm_name: &str,
        alarm_description: &str,
        station: &str,
        obs: &Observation,
        channels: &[ChannelSpec],
        trigger_context: &HashMap<Field, f64>,
        previous_value: &HashMap<Field, f64>,
    ) {
        let ctx = TemplateContext {
            alarm_name,
            alarm_description,
            station,
            obs,
            trigger_context,
            previous_value,
        };

        for channel in channels {
            let result: anyhow::Result<()> = match channel {
                ChannelSpec::Console { template } => {
                    console::send(&expand_template(template, &ctx));
                    Ok(())
                }
                ChannelSpec::Syslog { template } => {
                    syslog::send(&expand_template(template, &ctx))
                }
                ChannelSpec::Eventlog { template } => {
                    eventlog::send(&expand_template(template, &ctx))
                }
                ChannelSpec::Oslog { template } => oslog::send(&expand_template(template, &ctx)),
                ChannelSpec::Email { email: detail } => {
                    let subject = expand_template(&detail.subject, &ctx);
                    let body = expand_template(&detail.body, &ctx);
                    email::send(self.email_settings.as_ref(), detail, &subject, &body).await
                }
                ChannelSpec::Sms { sms: detail } => {
                    let message = expand_template(&detail.message, &ctx);
                    sms::send(self.sms_settings.as_ref(), detail, &message).await
                }
            };

            if let Err(e) = result {
                crate::alarm!(
                    "alarm '{}' failed to deliver on channel '{}': {e}",
                    alarm_name,
                    channel.kind()
                );
                error!(
                    "alarm '{}' channel '{}' delivery error: {e}",
                    alarm_name,
                    channel.kind()
                );
            }
        }
    }
}

struct TemplateContext<'a> {
    alarm_name: &'a str,
    alarm_description: &'a str,
    station: &'a str,
    obs: &'a Observation,
    trigger_context: &'a HashMap<Field, f64>,
    previous_value: &'a HashMap<Field, f64>,
}

#[derive(Clone, Copy)]
enum Conv {
    Identity,
    CelsiusToFahrenheit,
}

struct VarSpec {
    field: Field,
    conv: Conv,
    precision: usize,
}

fn var_spec(name: &str) -> Option<VarSpec> {
    Some(match name {
        "temperature" | "temperature_c" => VarSpec {
            field: Field::Temperature,
            conv: Conv::Identity,
            precision: 1,
        },
        "temperature_f" => VarSpec {
            field: Field::Temperature,
            conv: Conv::CelsiusToFahrenheit,
            precision: 1,
        },
        "humidity" => VarSpec {
            field: Field::Humidity,
            conv: Conv::Identity,
            precision: 0,
        },
        "pressure" => VarSpec {
            field: Field::Pressure,
            conv: Conv::Identity,
            precision: 2,
        },
        "wind_speed" => VarSpec {
            field: Field::WindSpeed,
            conv: Conv::Identity,
            precision: 1,
        },
        "wind_gust" => VarSpec {
            field: Field::WindGust,
            conv: Conv::Identity,
            precision: 1,
        },
        "wind_direction" => VarSpec {
            field: Field::WindDirection,
            conv: Conv::Identity,
            precision: 0,
        },
        "lux" => VarSpec {
            field: Field::Lux,
            conv: Conv::Identity,
            precision: 0,
        },
        "uv" => VarSpec {
            field: Field::Uv,
            conv: Conv::Identity,
            precision: 0,
        },
        "rain_rate" => VarSpec {
            field: Field::RainRate,
            conv: Conv::Identity,
            precision: 2,
        },
        "rain_daily" => VarSpec {
            field: Field::RainDaily,
            conv: Conv::Identity,
            precision: 2,
        },
        "lightning_count" => VarSpec {
            field: Field::LightningCount,
            conv: Conv::Identity,
            precision: 0,
        },
        "lightning_distance" => VarSpec {
            field: Field::LightningDistance,
            conv: Conv::Identity,
            precision: 1,
        },
        _ => return None,
    })
}

fn apply(conv: Conv, value: f64) -> f64 {
    match conv {
        Conv::Identity => value,
        Conv::CelsiusToFahrenheit => units::celsius_to_fahrenheit(value),
    }
}

fn format_value(spec: &VarSpec, raw: f64) -> String {
    format!("{:.*}", spec.precision, apply(spec.conv, raw))
}

/// Expand all `{{var}}` placeholders in `template` against `ctx` in a
/// single pass, per spec §4.5. Unknown placeholders are left verbatim.
fn expand_template(template: &str, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let var_name = after[..end].trim();
                out.push_str(&resolve_variable(var_name, ctx));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit the rest verbatim.
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_variable(name: &str, ctx: &TemplateContext) -> String {
    match name {
        "alarm_name" => return ctx.alarm_name.to_string(),
        "alarm_description" => return ctx.alarm_description.to_string(),
        "station" => return ctx.station.to_string(),
        "timestamp" => return ctx.obs.timestamp.to_string(),
        _ => {}
    }

    if let Some(base) = name.strip_prefix("last_") {
        return match var_spec(base) {
            Some(spec) => {
                let prev = ctx
                    .trigger_context
                    .get(&spec.field)
                    .or_else(|| ctx.previous_value.get(&spec.field));
                match prev {
                    Some(raw) => format_value(&spec, *raw),
                    None => "N/A".to_string(),
                }
            }
            None => format!("{{{{{name}}}}}"),
        };
    }

    match var_spec(name) {
        Some(spec) => format_value(&spec, spec.field.value(ctx.obs)),
        None => format!("{{{{{name}}}}}"),
    }
}
