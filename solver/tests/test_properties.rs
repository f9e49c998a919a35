//! Property-based tests for indexing and game-rule structure.

use proptest::prelude::*;

use retrograde::games::{ColumnRace, RaceRules, RaceState};
use retrograde::index::{BoundedCompositions, MixedRadix};
use retrograde::TurnGame;

/// Strategy: radices and an index inside their product.
fn radix_and_index() -> impl Strategy<Value = (Vec<u32>, u64)> {
    prop::collection::vec(1u32..7, 1..7).prop_flat_map(|radices| {
        let len: u64 = radices.iter().map(|&r| r as u64).product();
        (Just(radices), 0..len)
    })
}

/// Strategy: small but non-trivial race rules.
fn rules_strategy() -> impl Strategy<Value = RaceRules> {
    (2u32..=4, 1u32..=2, 1usize..=3, 1usize..=3).prop_map(
        |(sides, min_length, markers_per_turn, columns_to_win)| RaceRules {
            sides,
            min_length,
            markers_per_turn,
            columns_to_win,
        },
    )
}

/// Strategy: a race and a board inside its index space.
fn race_and_board() -> impl Strategy<Value = (RaceRules, Vec<u32>)> {
    rules_strategy().prop_flat_map(|rules| {
        let digits: Vec<_> = rules.column_lengths().into_iter().map(|l| 0..=l).collect();
        (Just(rules), digits)
    })
}

proptest! {
    // 1. decode and encode are inverse
    #[test]
    fn mixed_radix_bijection((radices, index) in radix_and_index()) {
        let mr = MixedRadix::new(radices);
        let digits = mr.decode(index);
        prop_assert_eq!(mr.encode(&digits), index);
        for (d, &digit) in digits.iter().enumerate() {
            prop_assert_eq!(mr.digit(index, d), digit);
        }
    }

    // 2. composition count matches enumeration, every item respects bounds and sum
    #[test]
    fn compositions_are_complete(
        bounds in prop::collection::vec(0u32..5, 0..5),
        total in 0u32..12,
    ) {
        let all: Vec<Vec<u32>> = BoundedCompositions::new(bounds.clone(), total).collect();
        prop_assert_eq!(all.len() as u64, BoundedCompositions::count(&bounds, total));
        for (c, pair) in all.iter().zip(all.iter().skip(1)) {
            prop_assert!(c < pair, "not strictly increasing: {:?} then {:?}", c, pair);
        }
        for c in &all {
            prop_assert_eq!(c.iter().sum::<u32>(), total);
            prop_assert!(c.iter().zip(&bounds).all(|(d, b)| d <= b));
        }
    }

    // 3. race boards survive index round trips, and layer equals spaces left
    #[test]
    fn race_index_bijection((rules, board) in race_and_board()) {
        prop_assume!(rules.validate().is_ok());
        let game = ColumnRace::new(rules).unwrap();
        let state = RaceState(board);
        let index = game.index_of(&state);
        prop_assert!(index < game.num_states());
        prop_assert_eq!(&game.state_at(index), &state);

        let left: u32 = game.lengths().iter().zip(state.positions()).map(|(l, p)| l - p).sum();
        prop_assert_eq!(game.layer_of(&state), left as usize);
    }

    // 4. mirroring is an involution that keeps the layer
    #[test]
    fn race_mirror_involution((rules, board) in race_and_board()) {
        prop_assume!(rules.validate().is_ok());
        let game = ColumnRace::new(rules).unwrap();
        let state = RaceState(board);
        let twin = game.mirror(&state).unwrap();
        prop_assert_eq!(game.layer_of(&twin), game.layer_of(&state));
        prop_assert_eq!(game.is_final(&twin), game.is_final(&state));
        prop_assert_eq!(game.mirror(&twin), Some(state));
    }
}

// 5. every turn ends strictly below the anchor's layer
#[test]
fn turn_ends_land_in_lower_layers() {
    let game = ColumnRace::new(RaceRules {
        sides: 3,
        min_length: 1,
        markers_per_turn: 2,
        columns_to_win: 2,
    })
    .unwrap();

    let mut checked = 0;
    for layer in 0..game.layer_count() {
        for anchor in game.anchors(layer) {
            if !game.is_reachable(&anchor) || game.is_final(&anchor) {
                continue;
            }
            for position in game.turn_positions(&anchor) {
                let next = game.end_turn(&position);
                assert!(
                    game.layer_of(&next) < layer,
                    "{anchor:?} (layer {layer}) ends at {next:?}"
                );
                checked += 1;
            }
        }
    }
    assert!(checked > 0);
}

// 6. roll probabilities form a distribution
#[test]
fn race_rolls_sum_to_one() {
    for sides in 1..=6 {
        let game = ColumnRace::new(RaceRules {
            sides,
            min_length: 1,
            markers_per_turn: 1,
            columns_to_win: 1,
        })
        .unwrap();
        let total: f64 = game.rolls().iter().map(|&(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12, "sides={sides} total={total}");
    }
}
