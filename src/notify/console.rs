//! Console channel: format the template, emit on the out-of-band alarm
//! log sink so it is visible regardless of the configured `--log-level`.

pub fn send(message: &str) {
    crate::alarm!("{}", message);
}
