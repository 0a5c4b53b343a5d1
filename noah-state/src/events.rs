// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Events of the block being built. They are stored by height next to the state, outside of
//! its root hash, when the block is committed.

use crate::bus::EventsBus;
use noah_db_exports::{ShareableTreeStore, EVENTS_DESER_ERROR, EVENTS_SER_ERROR};
use noah_models::event::{Event, EventsDeserializer, EventsSerializer};
use noah_serialization::{DeserializeError, Deserializer, Serializer};
use tracing::debug;

pub struct Events {
    db: ShareableTreeStore,
    pending: Vec<Event>,
}

impl Events {
    pub fn new(db: ShareableTreeStore) -> Self {
        Events {
            db,
            pending: Vec::new(),
        }
    }

    /// Events recorded so far in the current block
    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    /// Stored events of the block at `height`, empty if it recorded none
    pub fn load_events(&self, height: u64) -> Vec<Event> {
        match self.db.read().get_events(height) {
            Some(bytes) => {
                let (_, events) = EventsDeserializer::new()
                    .deserialize::<DeserializeError>(&bytes)
                    .expect(EVENTS_DESER_ERROR);
                events
            }
            None => Vec::new(),
        }
    }

    /// Hands the pending events to the store, written with the next version
    pub fn commit(&mut self, height: u64) {
        let events = std::mem::take(&mut self.pending);
        if events.is_empty() {
            return;
        }
        let mut bytes = Vec::new();
        EventsSerializer::new()
            .serialize(&events, &mut bytes)
            .expect(EVENTS_SER_ERROR);
        debug!("{} events recorded at height {}", events.len(), height);
        self.db.write().set_events(height, bytes);
    }
}

impl EventsBus for Events {
    fn add_event(&mut self, event: Event) {
        self.pending.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tools::{address, open_store};
    use noah_models::event::Role;
    use noah_models::{Amount, Pubkey};

    #[test]
    fn test_events_are_stored_at_their_height() {
        let (_dir, db) = open_store();
        let mut events = Events::new(db.clone());
        let reward = Event::Reward {
            role: Role::Validator,
            address: address(1),
            amount: Amount::from_noah(3),
            validator_pub_key: Pubkey::from_bytes([4; 32]),
        };
        events.add_event(reward.clone());
        assert_eq!(events.pending().len(), 1);
        assert!(events.load_events(5).is_empty());

        events.commit(5);
        db.write().save_version().unwrap();
        assert!(events.pending().is_empty());
        assert_eq!(Events::new(db.clone()).load_events(5), vec![reward]);

        // a block without events leaves nothing behind
        events.commit(6);
        db.write().save_version().unwrap();
        assert!(events.load_events(6).is_empty());
    }
}
