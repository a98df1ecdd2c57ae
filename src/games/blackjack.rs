//! Blackjack shuffle/deal engine and hand state machine.
//!
//! The deck permutation is fixed at deal time from the round digest; every
//! later draw pops from the end of that permutation. Hand transitions are
//! guarded per action, and split settlement goes through a decision table
//! keyed by the per-hand outcomes against the single dealer result.

use crate::errors::EngineError;
use crate::fairness;
use serde::{Deserialize, Serialize};

/// Dealer draws to 17 or better.
const DEALER_STAND: u8 = 17;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Suit {
    #[serde(rename = "D")]
    Diamonds,
    #[serde(rename = "H")]
    Hearts,
    #[serde(rename = "S")]
    Spades,
    #[serde(rename = "C")]
    Clubs,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

impl Rank {
    const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Counting value with aces high; soft-ace reduction happens in
    /// [`hand_value`].
    fn value(&self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
            Rank::Ace => 11,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

/// Hand value with each ace demoted from 11 to 1 while the total busts.
pub fn hand_value(cards: &[Card]) -> u8 {
    let mut value: u8 = cards.iter().map(|c| c.rank.value()).sum();
    let mut aces = cards.iter().filter(|c| c.rank == Rank::Ace).count();
    while value > 21 && aces > 0 {
        value -= 10;
        aces -= 1;
    }
    value
}

/// A two-card 21.
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards) == 21
}

/// Display history tokens recorded per hand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActionToken {
    Deal,
    Hit,
    Stand,
    Double,
    Split,
    Insurance,
    NoInsurance,
    Bust,
    Full,
    Blackjack,
}

/// Per-hand control state; everything except `Playing` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandState {
    Playing,
    Stood,
    Doubled,
    Busted,
    TwentyOne,
}

impl HandState {
    pub fn is_terminal(&self) -> bool {
        *self != HandState::Playing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandSide {
    pub cards: Vec<Card>,
    pub value: u8,
    pub actions: Vec<ActionToken>,
    pub state: HandState,
}

impl HandSide {
    fn new(cards: Vec<Card>, actions: Vec<ActionToken>, state: HandState) -> Self {
        let value = hand_value(&cards);
        Self {
            cards,
            value,
            actions,
            state,
        }
    }

    fn push_card(&mut self, card: Card) {
        self.cards.push(card);
        self.value = hand_value(&self.cards);
    }
}

/// Player's insurance decision against a dealer ace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InsuranceChoice {
    Undecided,
    Taken,
    Declined,
}

/// Full hand state, including the hidden hole card and remaining deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackjackState {
    /// One hand, or two after a split.
    pub hands: Vec<HandSide>,
    pub dealer: HandSide,
    /// Dealer's second card while face down. Never returns to the deck.
    pub hole_card: Option<Card>,
    pub deck: Vec<Card>,
    pub split: bool,
    pub insurance: InsuranceChoice,
}

/// Player-visible hand projection: parallel arrays of hands for dealer and
/// player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandView {
    pub cards: Vec<Card>,
    pub value: u8,
    pub actions: Vec<ActionToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackjackView {
    pub dealer: Vec<HandView>,
    pub player: Vec<HandView>,
}

/// Result of one player action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Continue,
    Settle(f64),
}

/// Per-hand result against the dealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOutcome {
    Win,
    Lose,
    Push,
}

/// Combined multiplier for a split pair of hand outcomes, on the base
/// stake. Total over all nine pairings.
pub fn split_multiplier(first: HandOutcome, second: HandOutcome) -> f64 {
    use HandOutcome::*;
    match (first, second) {
        (Win, Win) => 4.0,
        (Win, Lose) | (Lose, Win) => 2.0,
        (Win, Push) | (Push, Win) => 2.5,
        (Lose, Push) | (Push, Lose) => 1.0,
        (Push, Push) => 2.0,
        (Lose, Lose) => 0.0,
    }
}

fn single_multiplier(outcome: HandOutcome, doubled: bool) -> f64 {
    let base = match outcome {
        HandOutcome::Win => 2.0,
        HandOutcome::Push => 1.0,
        HandOutcome::Lose => 0.0,
    };
    if doubled {
        base * 2.0
    } else {
        base
    }
}

fn hand_outcome(hand: &HandSide, dealer_value: u8) -> HandOutcome {
    if hand.state == HandState::Busted {
        HandOutcome::Lose
    } else if dealer_value > 21 || hand.value > dealer_value {
        HandOutcome::Win
    } else if hand.value < dealer_value {
        HandOutcome::Lose
    } else {
        HandOutcome::Push
    }
}

/// Small deterministic mixer keyed off the round digest, driving the
/// Fisher-Yates shuffle.
struct DigestMix {
    h: u32,
}

impl DigestMix {
    fn new(key: &str) -> Self {
        let mut h = 1779033703u32 ^ key.len() as u32;
        for &b in key.as_bytes() {
            h = (h ^ b as u32).wrapping_mul(3432918353);
            h = h.rotate_left(13);
        }
        Self { h }
    }

    fn next(&mut self) -> u32 {
        self.h = (self.h ^ (self.h >> 16)).wrapping_mul(2246822507);
        self.h = (self.h ^ (self.h >> 13)).wrapping_mul(3266489909);
        self.h ^= self.h >> 16;
        self.h
    }
}

/// Deterministic 52-card permutation for one round. Cards are dealt by
/// popping from the end.
pub fn shuffled_deck(digest: &str) -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for suit in [Suit::Diamonds, Suit::Hearts, Suit::Spades, Suit::Clubs] {
        for rank in Rank::ALL {
            deck.push(Card { rank, suit });
        }
    }

    let mut mix = DigestMix::new(digest);
    for i in (1..deck.len()).rev() {
        let j = mix.next() as usize % (i + 1);
        deck.swap(i, j);
    }
    deck
}

impl BlackjackState {
    /// Deal a fresh hand for one round. Returns the state and, when the
    /// naturals resolve the hand immediately, the settlement multiplier.
    ///
    /// A natural on either side is ambiguous while the dealer shows an ace:
    /// the hole card stays hidden and the hand remains active pending an
    /// insurance decision or a player action.
    pub fn deal(server_seed: &str, client_seed: &str, nonce: u64) -> (Self, Option<f64>) {
        let digest = fairness::round_digest(server_seed, client_seed, nonce);
        let mut deck = shuffled_deck(&digest);

        let mut dealer_cards = Vec::with_capacity(2);
        while dealer_cards.len() < 2 {
            dealer_cards.push(deck.pop().expect("fresh deck has 52 cards"));
        }
        let mut player_cards = Vec::with_capacity(2);
        while player_cards.len() < 2 {
            player_cards.push(deck.pop().expect("fresh deck has 52 cards"));
        }

        let player_natural = is_natural(&player_cards);
        let dealer_natural = is_natural(&dealer_cards);
        let ace_up = dealer_cards[0].rank == Rank::Ace;

        let settled = if (player_natural || dealer_natural) && !ace_up {
            if player_natural && dealer_natural {
                Some(1.0)
            } else if player_natural {
                Some(2.5)
            } else {
                Some(0.0)
            }
        } else {
            None
        };

        let mut player_actions = vec![ActionToken::Deal];
        let mut dealer_actions = vec![ActionToken::Deal];
        if settled.is_some() {
            if player_natural {
                player_actions.push(ActionToken::Blackjack);
            }
            if dealer_natural {
                dealer_actions.push(ActionToken::Blackjack);
            }
        }

        let mut dealer = HandSide::new(dealer_cards, dealer_actions, HandState::Stood);
        let mut hole_card = None;
        if settled.is_none() {
            // Hand stays open: withhold the dealer's second card.
            hole_card = dealer.cards.pop();
            dealer.value = hand_value(&dealer.cards);
        }

        let player_state = if player_natural {
            HandState::TwentyOne
        } else {
            HandState::Playing
        };
        let hands = vec![HandSide::new(player_cards, player_actions, player_state)];

        let state = Self {
            hands,
            dealer,
            hole_card,
            deck,
            split: false,
            insurance: InsuranceChoice::Undecided,
        };
        (state, settled)
    }

    pub fn view(&self) -> BlackjackView {
        BlackjackView {
            dealer: vec![HandView {
                cards: self.dealer.cards.clone(),
                value: self.dealer.value,
                actions: self.dealer.actions.clone(),
            }],
            player: self
                .hands
                .iter()
                .map(|h| HandView {
                    cards: h.cards.clone(),
                    value: h.value,
                    actions: h.actions.clone(),
                })
                .collect(),
        }
    }

    /// Index of the hand currently acting: the first hand until it reaches
    /// a terminal state, then the second.
    fn active_hand(&self) -> Option<usize> {
        self.hands.iter().position(|h| h.state == HandState::Playing)
    }

    fn draw(&mut self) -> Result<Card, EngineError> {
        self.deck
            .pop()
            .ok_or(EngineError::InvalidAction("deck exhausted"))
    }

    /// Fold the hole card back into the dealer's visible hand.
    fn reveal_hole(&mut self) {
        if let Some(card) = self.hole_card.take() {
            self.dealer.push_card(card);
        }
    }

    /// Dealer reveals and auto-hits until standing at 17+ or busting.
    fn dealer_play(&mut self) -> u8 {
        self.reveal_hole();
        while self.dealer.value < DEALER_STAND && !self.deck.is_empty() {
            let card = match self.draw() {
                Ok(card) => card,
                Err(_) => break,
            };
            self.dealer.push_card(card);
            self.dealer.actions.push(ActionToken::Hit);
        }
        if self.dealer.value > 21 {
            self.dealer.actions.push(ActionToken::Bust);
        } else if self.dealer.value == 21 {
            self.dealer.actions.push(ActionToken::Full);
        }
        self.dealer.value
    }

    /// Score every player hand against one dealer play-out.
    fn settle_against_dealer(&mut self) -> StepOutcome {
        let dealer_value = self.dealer_play();
        if self.split {
            let first = hand_outcome(&self.hands[0], dealer_value);
            let second = hand_outcome(&self.hands[1], dealer_value);
            StepOutcome::Settle(split_multiplier(first, second))
        } else {
            let outcome = hand_outcome(&self.hands[0], dealer_value);
            let doubled = self.hands[0].state == HandState::Doubled;
            StepOutcome::Settle(single_multiplier(outcome, doubled))
        }
    }

    /// After a hand reaches a terminal state: play the dealer if every hand
    /// is done, otherwise pass the turn.
    fn after_terminal(&mut self) -> StepOutcome {
        if self.hands.iter().any(|h| h.state == HandState::Playing) {
            return StepOutcome::Continue;
        }
        // All hands busted: lost outright, the dealer never plays.
        if self.hands.iter().all(|h| h.state == HandState::Busted) {
            return StepOutcome::Settle(0.0);
        }
        self.settle_against_dealer()
    }

    pub fn hit(&mut self) -> Result<StepOutcome, EngineError> {
        let idx = self
            .active_hand()
            .ok_or(EngineError::InvalidAction("no hand may act"))?;
        let card = self.draw()?;
        let hand = &mut self.hands[idx];
        hand.push_card(card);
        hand.actions.push(ActionToken::Hit);

        if hand.value > 21 {
            hand.actions.push(ActionToken::Bust);
            hand.state = HandState::Busted;
            Ok(self.after_terminal())
        } else if hand.value == 21 {
            hand.actions.push(ActionToken::Full);
            hand.state = HandState::TwentyOne;
            Ok(self.after_terminal())
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    pub fn stand(&mut self) -> Result<StepOutcome, EngineError> {
        let idx = self
            .active_hand()
            .ok_or(EngineError::InvalidAction("no hand may act"))?;
        let hand = &mut self.hands[idx];
        hand.actions.push(ActionToken::Stand);
        hand.state = HandState::Stood;
        Ok(self.after_terminal())
    }

    /// Doubling is only legal on an unsplit two-card hand whose last action
    /// was the deal or a resolved insurance decision.
    pub fn validate_double(&self) -> Result<(), EngineError> {
        if self.split {
            return Err(EngineError::InvalidAction("cannot double a split hand"));
        }
        let hand = &self.hands[0];
        if hand.state != HandState::Playing || hand.cards.len() != 2 {
            return Err(EngineError::InvalidAction("cannot double now"));
        }
        Ok(())
    }

    /// Apply a double-down: one card, then the hand is committed. The
    /// caller has already debited the additional stake.
    pub fn double_down(&mut self) -> Result<StepOutcome, EngineError> {
        self.validate_double()?;
        let card = self.draw()?;
        let hand = &mut self.hands[0];
        hand.actions.push(ActionToken::Double);
        hand.push_card(card);

        if hand.value > 21 {
            hand.actions.push(ActionToken::Bust);
            hand.state = HandState::Busted;
            return Ok(StepOutcome::Settle(0.0));
        }
        if hand.value == 21 {
            hand.actions.push(ActionToken::Full);
        }
        hand.state = HandState::Doubled;
        Ok(self.settle_against_dealer())
    }

    /// Splitting requires an unsplit two-card pair of equal rank.
    pub fn validate_split(&self) -> Result<(), EngineError> {
        if self.split || self.hands.len() != 1 {
            return Err(EngineError::InvalidAction("hand already split"));
        }
        let hand = &self.hands[0];
        if hand.state != HandState::Playing || hand.cards.len() != 2 {
            return Err(EngineError::InvalidAction("cannot split now"));
        }
        if hand.cards[0].rank != hand.cards[1].rank {
            return Err(EngineError::InvalidAction("cards are not a pair"));
        }
        Ok(())
    }

    /// Apply a split: each original card seeds one hand and receives one
    /// fresh card. A split ace pair gets no further cards; both hands are
    /// committed immediately. The caller has already debited the
    /// additional stake.
    pub fn split_hand(&mut self) -> Result<StepOutcome, EngineError> {
        self.validate_split()?;

        let first_card = self.hands[0].cards[0];
        let second_card = self.hands[0].cards[1];
        let ace_pair = first_card.rank == Rank::Ace;
        let prior_actions = {
            let mut actions = self.hands[0].actions.clone();
            actions.push(ActionToken::Split);
            actions
        };

        let first_draw = self.draw()?;
        let second_draw = self.draw()?;

        let build = |seed_card: Card, draw: Card| {
            let mut hand =
                HandSide::new(vec![seed_card, draw], prior_actions.clone(), HandState::Playing);
            if hand.value == 21 {
                hand.actions.push(ActionToken::Full);
                hand.state = HandState::TwentyOne;
            } else if ace_pair {
                hand.state = HandState::Stood;
            }
            hand
        };

        let hands = vec![build(first_card, first_draw), build(second_card, second_draw)];
        self.hands = hands;
        self.split = true;

        if self.hands.iter().all(|h| h.state.is_terminal()) {
            Ok(self.settle_against_dealer())
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    /// Insurance is offered only against a dealer ace, before any other
    /// action on the hand.
    pub fn validate_insurance(&self) -> Result<(), EngineError> {
        if self.split || self.hands.len() != 1 {
            return Err(EngineError::InvalidAction("insurance not available"));
        }
        if self.dealer.cards[0].rank != Rank::Ace || self.hole_card.is_none() {
            return Err(EngineError::InvalidAction("dealer is not showing an ace"));
        }
        if self.insurance != InsuranceChoice::Undecided {
            return Err(EngineError::InvalidAction("insurance already decided"));
        }
        if self.hands[0].cards.len() != 2 {
            return Err(EngineError::InvalidAction("insurance window has passed"));
        }
        Ok(())
    }

    /// Resolve the insurance decision: the dealer checks the hole card for
    /// a natural. Taken insurance on a dealer natural refunds the full
    /// exposure (1.5 on the base stake); otherwise a player natural now
    /// pays 3:2 and any other hand continues with the hole card still
    /// hidden. The caller has already debited the half-stake premium when
    /// `accept` is true.
    pub fn resolve_insurance(&mut self, accept: bool) -> Result<StepOutcome, EngineError> {
        self.validate_insurance()?;

        let player_natural = is_natural(&self.hands[0].cards);
        let hole = self.hole_card.as_ref().copied();
        let dealer_natural = match hole {
            Some(hole) => hand_value(&[self.dealer.cards[0], hole]) == 21,
            None => false,
        };

        let token = if accept {
            ActionToken::Insurance
        } else {
            ActionToken::NoInsurance
        };
        self.hands[0].actions.push(token);
        self.insurance = if accept {
            InsuranceChoice::Taken
        } else {
            InsuranceChoice::Declined
        };

        if dealer_natural {
            self.reveal_hole();
            self.dealer.actions.push(ActionToken::Blackjack);
            if player_natural {
                self.hands[0].actions.push(ActionToken::Blackjack);
            }
            let multiplier = if accept {
                1.5
            } else if player_natural {
                1.0
            } else {
                0.0
            };
            return Ok(StepOutcome::Settle(multiplier));
        }

        if player_natural {
            self.hands[0].actions.push(ActionToken::Blackjack);
            self.reveal_hole();
            return Ok(StepOutcome::Settle(2.5));
        }

        Ok(StepOutcome::Continue)
    }
}
