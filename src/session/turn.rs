use serde::Serialize;

use crate::types::{Pairing, PlayerSlot};

/// Whose turn it is, and whether a "Next" press moves the shared queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TurnTracker {
    current: PlayerSlot,
}

impl TurnTracker {
    pub fn current(&self) -> PlayerSlot {
        self.current
    }

    /// Hand the turn to the other player. Returns whether the question queue
    /// should advance too.
    ///
    /// With `Different` every press advances. With `Same` only the press that
    /// hands back from player 2 to player 1 does, so both players answer the
    /// same question before it changes.
    pub fn advance(&mut self, pairing: Pairing) -> bool {
        let previous = self.current;
        self.current = previous.other();

        match pairing {
            Pairing::Different => true,
            Pairing::Same => previous == PlayerSlot::Player2,
        }
    }

    pub fn reset(&mut self) {
        self.current = PlayerSlot::Player1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_different_pairing_always_advances() {
        let mut turns = TurnTracker::default();
        assert!(turns.advance(Pairing::Different));
        assert_eq!(turns.current(), PlayerSlot::Player2);
        assert!(turns.advance(Pairing::Different));
        assert_eq!(turns.current(), PlayerSlot::Player1);
    }

    #[test]
    fn test_same_pairing_advances_every_second_press() {
        let mut turns = TurnTracker::default();
        let moves: Vec<bool> = (0..8).map(|_| turns.advance(Pairing::Same)).collect();

        assert_eq!(moves.iter().filter(|m| **m).count(), 4);
        assert_eq!(
            moves,
            vec![false, true, false, true, false, true, false, true]
        );
        assert_eq!(turns.current(), PlayerSlot::Player1);
    }

    #[test]
    fn test_switching_pairing_mid_pair() {
        let mut turns = TurnTracker::default();
        assert!(!turns.advance(Pairing::Same));
        // Player 2 is up; a switch to Different moves right away
        assert!(turns.advance(Pairing::Different));
        assert_eq!(turns.current(), PlayerSlot::Player1);
    }
}
