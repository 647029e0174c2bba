use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuxSend {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
}

impl AuxSend {
    #[must_use]
    pub fn new(from: Uuid, to: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
        }
    }

    #[must_use]
    pub fn touches(&self, track_id: Uuid) -> bool {
        self.from == track_id || self.to == track_id
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("track {0} cannot send to itself")]
    SelfSend(Uuid),
    #[error("send from {from} to {to} already exists")]
    Duplicate { from: Uuid, to: Uuid },
    #[error("send from {from} to {to} would create a cycle")]
    Cycle { from: Uuid, to: Uuid },
    #[error("send not found: {0}")]
    SendNotFound(Uuid),
}

/// Checks a proposed `from -> to` send against the existing edges.
///
/// The cycle check walks forward from `to`; reaching `from`, or a node already on the current
/// path, rejects the edge. Nodes fully explored without a hit are not walked again, so shared
/// descendants (diamonds) are fine and the walk stays linear in the edge count.
pub fn validate_send(from: Uuid, to: Uuid, sends: &[AuxSend]) -> Result<(), RoutingError> {
    if from == to {
        return Err(RoutingError::SelfSend(from));
    }
    if sends.iter().any(|send| send.from == from && send.to == to) {
        return Err(RoutingError::Duplicate { from, to });
    }

    let mut walk = Walk {
        sends,
        target: from,
        path: HashSet::new(),
        exhausted: HashSet::new(),
    };
    if walk.reaches(to) {
        return Err(RoutingError::Cycle { from, to });
    }
    Ok(())
}

#[must_use]
pub fn is_valid_send(from: Uuid, to: Uuid, sends: &[AuxSend]) -> bool {
    validate_send(from, to, sends).is_ok()
}

struct Walk<'a> {
    sends: &'a [AuxSend],
    target: Uuid,
    path: HashSet<Uuid>,
    exhausted: HashSet<Uuid>,
}

impl Walk<'_> {
    fn reaches(&mut self, node: Uuid) -> bool {
        if node == self.target || self.path.contains(&node) {
            return true;
        }
        if self.exhausted.contains(&node) {
            return false;
        }

        self.path.insert(node);
        let sends = self.sends;
        let found = sends
            .iter()
            .filter(|send| send.from == node)
            .any(|send| self.reaches(send.to));
        self.path.remove(&node);

        if !found {
            self.exhausted.insert(node);
        }
        found
    }
}

/// The aux-send edges layered over the mixer's tracks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Routing {
    sends: Vec<AuxSend>,
}

impl Routing {
    #[must_use]
    pub fn sends(&self) -> &[AuxSend] {
        &self.sends
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sends.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
    }

    pub fn add_send(&mut self, from: Uuid, to: Uuid) -> Result<AuxSend, RoutingError> {
        self.insert_send(AuxSend::new(from, to))
    }

    /// Like [`Routing::add_send`] but keeps the id already carried by `send`.
    pub fn insert_send(&mut self, send: AuxSend) -> Result<AuxSend, RoutingError> {
        validate_send(send.from, send.to, &self.sends)?;
        self.sends.push(send);
        Ok(send)
    }

    pub fn remove_send(&mut self, id: Uuid) -> Result<AuxSend, RoutingError> {
        let index = self
            .sends
            .iter()
            .position(|send| send.id == id)
            .ok_or(RoutingError::SendNotFound(id))?;
        Ok(self.sends.remove(index))
    }

    /// Drops every send with `track_id` at either end.
    pub fn remove_sends_for_track(&mut self, track_id: Uuid) -> Vec<AuxSend> {
        let (removed, kept) = self
            .sends
            .drain(..)
            .partition(|send| send.touches(track_id));
        self.sends = kept;
        removed
    }

    pub fn sends_from(&self, track_id: Uuid) -> impl Iterator<Item = &AuxSend> {
        self.sends.iter().filter(move |send| send.from == track_id)
    }

    pub fn sends_to(&self, track_id: Uuid) -> impl Iterator<Item = &AuxSend> {
        self.sends.iter().filter(move |send| send.to == track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<const N: usize>() -> [Uuid; N] {
        std::array::from_fn(|_| Uuid::new_v4())
    }

    #[test]
    fn reverse_edge_is_a_cycle() {
        let [a, b] = ids();
        assert!(is_valid_send(a, b, &[]));
        let sends = [AuxSend::new(a, b)];
        assert_eq!(
            validate_send(b, a, &sends),
            Err(RoutingError::Cycle { from: b, to: a })
        );
    }

    #[test]
    fn self_and_duplicate_sends_are_rejected() {
        let [a, b] = ids();
        assert_eq!(validate_send(a, a, &[]), Err(RoutingError::SelfSend(a)));
        let sends = [AuxSend::new(a, b)];
        assert_eq!(
            validate_send(a, b, &sends),
            Err(RoutingError::Duplicate { from: a, to: b })
        );
    }

    #[test]
    fn diamonds_are_allowed_but_long_cycles_are_not() {
        let [a, b, c, d] = ids();
        let sends = [
            AuxSend::new(a, b),
            AuxSend::new(a, c),
            AuxSend::new(b, d),
            AuxSend::new(c, d),
        ];
        assert!(is_valid_send(b, c, &sends));
        assert!(!is_valid_send(d, a, &sends));
        assert!(is_valid_send(d, Uuid::new_v4(), &sends));
    }

    #[test]
    fn removing_a_track_drops_both_directions() {
        let [a, b, c] = ids();
        let mut routing = Routing::default();
        routing.add_send(a, b).expect("a -> b is valid");
        routing.add_send(b, c).expect("b -> c is valid");
        routing.add_send(a, c).expect("a -> c is valid");

        let removed = routing.remove_sends_for_track(b);
        assert_eq!(removed.len(), 2);
        assert_eq!(routing.len(), 1);
        assert_eq!(routing.sends_from(a).count(), 1);
        assert_eq!(routing.sends_to(b).count(), 0);
    }

    #[test]
    fn failed_add_leaves_routing_untouched() {
        let [a, b] = ids();
        let mut routing = Routing::default();
        routing.add_send(a, b).expect("a -> b is valid");
        assert!(routing.add_send(b, a).is_err());
        assert_eq!(routing.len(), 1);
    }
}
