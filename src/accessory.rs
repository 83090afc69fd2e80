//! L8: accessory-bridge cache. HomeKit itself is an external protocol
//! collaborator (spec §1 Non-goals); this module only holds the latest
//! observation so whatever bridges to HomeKit outside this crate has
//! something to read.

use tokio::sync::RwLock;

use crate::observation::Observation;

pub struct AccessoryState {
    latest: RwLock<Option<Observation>>,
}

impl AccessoryState {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(None),
        }
    }

    pub async fn update(&self, obs: Observation) {
        *self.latest.write().await = Some(obs);
    }

    pub async fn latest(&self) -> Option<Observation> {
        *self.latest.read().await
    }
}

impl Default for AccessoryState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_replaces_latest() {
        let state = AccessoryState::new();
        assert!(state.latest().await.is_none());
        state.update(Observation::at(5)).await;
        assert_eq!(state.latest().await.unwrap().timestamp, 5);
    }
}
