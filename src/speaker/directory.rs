use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::RwLock;
use regex::Regex;

use crate::speaker::lookup::SpeakerLookup;
use crate::speaker::models::Speaker;
use crate::speaker::storage::SpeakerStore;

/// Maps raw comment user ids to display names through memory, the durable
/// store and finally the platform API.
///
/// Resolution never fails: ids that cannot be resolved come back as a
/// registered speaker named after the raw id, and non-numeric ids come back
/// as the shared anonymous speaker.
pub struct SpeakerDirectory {
    memory: RwLock<HashMap<i64, Speaker>>,
    store: Arc<dyn SpeakerStore>,
    remote: Arc<dyn SpeakerLookup>,
    registered_id: Regex,
}

impl SpeakerDirectory {
    pub fn new(store: Arc<dyn SpeakerStore>, remote: Arc<dyn SpeakerLookup>) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            store,
            remote,
            registered_id: Regex::new(r"^[0-9]+$").expect("static pattern"),
        }
    }

    pub async fn resolve(&self, raw_id: &str) -> Speaker {
        if !self.registered_id.is_match(raw_id) {
            return Speaker::anonymous();
        }

        let id = match raw_id.parse::<i64>() {
            Ok(id) => id,
            Err(_) => return Self::degraded(0, raw_id),
        };

        if let Some(speaker) = self.memory.read().get(&id) {
            trace!("Speaker {} resolved from memory", id);
            return speaker.clone();
        }

        match self.store.load(id) {
            Ok(Some(speaker)) => {
                trace!("Speaker {} resolved from store", id);
                self.memory.write().insert(id, speaker.clone());
                return speaker;
            }
            Ok(None) => {}
            Err(e) => warn!("Speaker store read failed for {}: {}", id, e),
        }

        match self.remote.lookup(id).await {
            Ok(speaker) => {
                debug!("Speaker {} resolved remotely as {}", id, speaker.name);
                if let Err(e) = self.store.save(&speaker) {
                    warn!("Failed to persist speaker {}: {}", id, e);
                }
                self.memory.write().insert(id, speaker.clone());
                speaker
            }
            Err(e) => {
                debug!("Speaker lookup failed for {}: {}", id, e);
                Self::degraded(id, raw_id)
            }
        }
    }

    pub fn cached(&self) -> usize {
        self.memory.read().len()
    }

    fn degraded(id: i64, raw_id: &str) -> Speaker {
        Speaker {
            id,
            name: raw_id.to_string(),
            registered: true,
        }
    }
}
