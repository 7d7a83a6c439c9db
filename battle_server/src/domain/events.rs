// Events produced while computing a turn and their visibility scopes.

use super::state::{BotId, BulletState};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    BotDeath {
        victim_id: BotId,
    },
    BotHitWall {
        victim_id: BotId,
    },
    BotHitBot {
        bot_id: BotId,
        victim_id: BotId,
        victim_energy: f64,
        x: f64,
        y: f64,
        rammed: bool,
    },
    BulletFired {
        bullet: BulletState,
    },
    BulletHitWall {
        bullet: BulletState,
    },
    BulletHitBullet {
        bullet: BulletState,
        hit_bullet: BulletState,
    },
    BulletHitBot {
        bullet: BulletState,
        victim_id: BotId,
        damage: f64,
        victim_energy: f64,
    },
    ScannedBot {
        scanned_by_bot_id: BotId,
        scanned_bot_id: BotId,
        energy: f64,
        x: f64,
        y: f64,
        direction: f64,
        speed: f64,
    },
}

/// Events of a single turn, split by audience.
///
/// Observers see every event once. Bots see their private events plus public ones
/// such as deaths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnEvents {
    observer: Vec<Event>,
    public: Vec<Event>,
    private: BTreeMap<BotId, Vec<Event>>,
}

impl TurnEvents {
    /// Delivers `event` privately to each recipient and once to observers.
    pub fn emit(&mut self, recipients: &[BotId], event: Event) {
        for bot_id in recipients {
            self.push_private(*bot_id, event.clone());
        }
        self.observer.push(event);
    }

    /// Delivers `event` to every bot and to observers.
    pub fn emit_public(&mut self, event: Event) {
        self.public.push(event.clone());
        self.observer.push(event);
    }

    pub fn push_private(&mut self, bot_id: BotId, event: Event) {
        self.private.entry(bot_id).or_default().push(event);
    }

    pub fn push_observer(&mut self, event: Event) {
        self.observer.push(event);
    }

    pub fn observer(&self) -> &[Event] {
        &self.observer
    }

    /// Events scoped to one bot: its private events followed by public ones.
    pub fn for_bot(&self, bot_id: BotId) -> Vec<Event> {
        self.private
            .get(&bot_id)
            .into_iter()
            .flatten()
            .chain(self.public.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.observer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_event_is_emitted_to_two_bots_then_observers_see_it_once() {
        let mut events = TurnEvents::default();
        events.emit(&[1, 2], Event::BotHitWall { victim_id: 1 });

        assert_eq!(events.observer().len(), 1);
        assert_eq!(events.for_bot(1).len(), 1);
        assert_eq!(events.for_bot(2).len(), 1);
        assert!(events.for_bot(3).is_empty());
    }

    #[test]
    fn when_event_is_public_then_every_bot_sees_it() {
        let mut events = TurnEvents::default();
        events.push_private(1, Event::BotHitWall { victim_id: 1 });
        events.emit_public(Event::BotDeath { victim_id: 2 });

        assert_eq!(
            events.for_bot(1),
            vec![
                Event::BotHitWall { victim_id: 1 },
                Event::BotDeath { victim_id: 2 }
            ]
        );
        assert_eq!(events.for_bot(7), vec![Event::BotDeath { victim_id: 2 }]);
        assert_eq!(events.observer(), &[Event::BotDeath { victim_id: 2 }]);
    }
}
