//! Trade arbiter: a two-party negotiation that freezes the turn machine.

use tracing::info;

use crate::state::{
    engine::{self, Outcome, Rejection, RoomEvent, Rules, Severity},
    room::{Room, Slot, Trade},
    state_machine::{TurnEvent, TurnPhase},
};

/// Propose `offer_amount` sanity for `tile` to its current owner.
///
/// Funds are only checked here, not reserved; acceptance re-validates them.
/// The owner must be connected to receive the offer.
pub fn offer(
    room: &mut Room,
    rules: &Rules,
    proposer: Slot,
    tile: usize,
    offer_amount: i32,
) -> Result<Outcome, Rejection> {
    if room.trade.is_some() {
        return Err(Rejection::TradePending);
    }
    if !matches!(room.phase(), TurnPhase::Roll | TurnPhase::Decision { .. }) {
        return Err(Rejection::WrongPhase {
            phase: room.phase().clone(),
        });
    }
    if rules.trade_requires_turn && proposer != room.current_slot {
        return Err(Rejection::NotYourTurn { slot: proposer });
    }
    if offer_amount < 0 {
        return Err(Rejection::InvalidOffer("offer amount must not be negative"));
    }

    let bidder = room
        .player(proposer)
        .filter(|player| player.is_seated())
        .ok_or(Rejection::UnknownSlot(proposer))?;
    if bidder.eliminated {
        return Err(Rejection::Eliminated(proposer));
    }
    if bidder.sanity < offer_amount {
        return Err(Rejection::InsufficientSanity {
            required: offer_amount,
            available: bidder.sanity,
        });
    }

    let owner = match room.owner_of(tile) {
        Some(owner) if owner != proposer => owner,
        Some(_) => return Err(Rejection::InvalidOffer("cannot trade with yourself")),
        None => return Err(Rejection::TileUnavailable(tile)),
    };
    // An absent owner could never answer and the turn would stay frozen.
    if !room.player(owner).is_some_and(|player| player.connected) {
        return Err(Rejection::Absent(owner));
    }

    let phase_to_restore = room.phase().clone();
    room.machine.apply(TurnEvent::TradeOpened)?;

    let trade = Trade {
        proposer,
        owner,
        tile,
        offer_amount,
        phase_to_restore,
    };
    room.trade = Some(trade.clone());

    let mut out = Outcome::changed();
    out.events.push(RoomEvent::TradeRequested(trade));
    out.log(
        format!("P{proposer} offers {offer_amount} sanity to P{owner} for {}.", tile_name(room, tile)),
        Severity::Info,
    );
    room.touch();
    Ok(out)
}

/// Answer the pending trade. Only the owner named in the trade may respond.
pub fn respond(
    room: &mut Room,
    rules: &Rules,
    slot: Slot,
    accepted: bool,
) -> Result<Outcome, Rejection> {
    let trade = room.trade.clone().ok_or(Rejection::NoTrade)?;
    if slot != trade.owner {
        return Err(Rejection::NotTradeTarget { slot });
    }

    let mut out = Outcome::changed();
    let mut transferred = false;
    if accepted {
        let funded = room
            .player(trade.proposer)
            .is_some_and(|player| !player.eliminated && player.sanity >= trade.offer_amount);
        let still_owned = room.owner_of(trade.tile) == Some(trade.owner);

        if funded && still_owned {
            if let Some(bidder) = room.player_mut(trade.proposer) {
                bidder.sanity -= trade.offer_amount;
                bidder.owned.insert(trade.tile);
            }
            if let Some(seller) = room.player_mut(trade.owner) {
                seller.sanity += trade.offer_amount;
                seller.owned.remove(&trade.tile);
            }
            transferred = true;
            out.log(
                format!(
                    "P{} sold {} to P{} for {} sanity.",
                    trade.owner,
                    tile_name(room, trade.tile),
                    trade.proposer,
                    trade.offer_amount
                ),
                Severity::Success,
            );
        } else {
            info!(
                room_id = %room.id,
                proposer = trade.proposer,
                owner = trade.owner,
                tile = trade.tile,
                funded,
                still_owned,
                "trade failed re-validation"
            );
            out.log("The trade fell through.", Severity::Warning);
        }
    } else {
        out.log(
            format!("P{} declined the offer.", trade.owner),
            Severity::Info,
        );
    }

    close(room, &trade);

    let bankrupt = room
        .player(trade.proposer)
        .is_some_and(|player| player.sanity <= 0);
    if transferred && bankrupt {
        engine::eliminate(room, rules, trade.proposer, &mut out);
    }

    room.touch();
    Ok(out)
}

/// Drop the pending trade without any transfer.
pub(crate) fn cancel(room: &mut Room, out: &mut Outcome) {
    let Some(trade) = room.trade.clone() else {
        return;
    };
    close(room, &trade);
    out.state_changed = true;
    out.log("The trade was cancelled.", Severity::Warning);
}

fn close(room: &mut Room, trade: &Trade) {
    room.trade = None;
    if let Err(err) = room.machine.apply(TurnEvent::TradeClosed {
        restore: trade.phase_to_restore.clone(),
    }) {
        tracing::warn!(room_id = %room.id, error = %err, "could not restore phase after trade");
    }
}

fn tile_name(room: &Room, tile: usize) -> String {
    room.board
        .tile(tile)
        .map(|tile| tile.name.clone())
        .unwrap_or_else(|| format!("tile {tile}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::engine::tests::room_with;

    fn rules() -> Rules {
        Rules::default()
    }

    #[test]
    fn rejected_offer_restores_phase_without_transfer() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(5);
        let before = room.players.clone();

        let out = offer(&mut room, &rules(), 1, 5, 30).unwrap();
        assert_eq!(room.phase(), &TurnPhase::Trading);
        assert!(matches!(
            out.events.first(),
            Some(RoomEvent::TradeRequested(Trade { owner: 2, .. }))
        ));

        respond(&mut room, &rules(), 2, false).unwrap();
        assert_eq!(room.players, before);
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert!(room.trade.is_none());
    }

    #[test]
    fn accepted_offer_transfers_tile_and_sanity() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(5);
        offer(&mut room, &rules(), 1, 5, 30).unwrap();
        respond(&mut room, &rules(), 2, true).unwrap();

        assert_eq!(room.player(1).unwrap().sanity, 70);
        assert_eq!(room.player(2).unwrap().sanity, 130);
        assert_eq!(room.owner_of(5), Some(1));
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }

    #[test]
    fn only_named_owner_may_answer() {
        let mut room = room_with(3);
        room.player_mut(2).unwrap().owned.insert(5);
        offer(&mut room, &rules(), 1, 5, 10).unwrap();

        assert_eq!(
            respond(&mut room, &rules(), 3, true).unwrap_err(),
            Rejection::NotTradeTarget { slot: 3 }
        );
        assert_eq!(
            respond(&mut room, &rules(), 1, true).unwrap_err(),
            Rejection::NotTradeTarget { slot: 1 }
        );
        assert_eq!(room.phase(), &TurnPhase::Trading);
    }

    #[test]
    fn offer_validation() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(5);
        room.player_mut(1).unwrap().owned.insert(3);

        assert_eq!(
            offer(&mut room, &rules(), 1, 8, 10).unwrap_err(),
            Rejection::TileUnavailable(8)
        );
        assert!(matches!(
            offer(&mut room, &rules(), 1, 3, 10).unwrap_err(),
            Rejection::InvalidOffer(_)
        ));
        assert!(matches!(
            offer(&mut room, &rules(), 1, 5, 101).unwrap_err(),
            Rejection::InsufficientSanity { .. }
        ));
        assert!(matches!(
            offer(&mut room, &rules(), 1, 5, -1).unwrap_err(),
            Rejection::InvalidOffer(_)
        ));
        assert_eq!(
            offer(&mut room, &rules(), 2, 3, 10).unwrap_err(),
            Rejection::NotYourTurn { slot: 2 }
        );
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }

    #[test]
    fn out_of_turn_offer_allowed_when_gate_disabled() {
        let mut room = room_with(2);
        room.player_mut(1).unwrap().owned.insert(3);
        let open = Rules {
            trade_requires_turn: false,
            ..Rules::default()
        };
        offer(&mut room, &open, 2, 3, 10).unwrap();
        assert_eq!(room.trade.as_ref().map(|t| t.owner), Some(1));
    }

    #[test]
    fn acceptance_fails_when_funds_vanished() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(5);
        offer(&mut room, &rules(), 1, 5, 40).unwrap();
        room.player_mut(1).unwrap().sanity = 20;

        respond(&mut room, &rules(), 2, true).unwrap();
        assert_eq!(room.owner_of(5), Some(2));
        assert_eq!(room.player(1).unwrap().sanity, 20);
        assert_eq!(room.player(2).unwrap().sanity, 100);
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }

    #[test]
    fn trade_interrupting_decision_resumes_decision() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(5);
        room.machine.apply(TurnEvent::DiceThrown).unwrap();
        room.machine
            .apply(TurnEvent::PurchaseOffered { tile: 1, price: 15 })
            .unwrap();

        offer(&mut room, &rules(), 1, 5, 10).unwrap();
        respond(&mut room, &rules(), 2, false).unwrap();
        assert_eq!(room.phase(), &TurnPhase::Decision { tile: 1, price: 15 });
    }

    #[test]
    fn spending_everything_on_a_trade_eliminates_the_buyer() {
        let mut room = room_with(3);
        room.player_mut(2).unwrap().owned.insert(5);
        room.player_mut(1).unwrap().sanity = 30;
        offer(&mut room, &rules(), 1, 5, 30).unwrap();
        respond(&mut room, &rules(), 2, true).unwrap();

        let buyer = room.player(1).unwrap();
        assert!(buyer.eliminated);
        assert!(buyer.owned.is_empty());
        assert_eq!(room.owner_of(5), None);
        assert_eq!(room.current_slot, 2);
    }

    #[test]
    fn offer_to_a_disconnected_owner_is_refused() {
        let mut room = room_with(2);
        {
            let owner = room.player_mut(2).unwrap();
            owner.owned.insert(5);
            owner.connected = false;
            owner.connection = None;
        }

        assert_eq!(
            offer(&mut room, &rules(), 1, 5, 30).unwrap_err(),
            Rejection::Absent(2)
        );
        assert!(room.trade.is_none());
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }

    #[test]
    fn acceptance_fails_when_the_owner_lost_the_tile() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(5);
        offer(&mut room, &rules(), 1, 5, 30).unwrap();
        room.player_mut(2).unwrap().owned.remove(&5);

        respond(&mut room, &rules(), 2, true).unwrap();
        assert_eq!(room.owner_of(5), None);
        assert_eq!(room.player(1).unwrap().sanity, 100);
        assert_eq!(room.player(2).unwrap().sanity, 100);
        assert!(room.trade.is_none());
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }
}
