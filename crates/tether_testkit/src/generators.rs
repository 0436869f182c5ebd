//! Property-based test generators using proptest.
//!
//! Widget ids are drawn from a small pool so generated mutation sequences
//! collide: adds of already-present elements, removes of absent ones, and
//! clears interleaved with both.

use crate::fixtures::{Mutation, Widget};
use proptest::prelude::*;

/// Strategy for widgets with ids from a small colliding pool.
pub fn widget_strategy() -> impl Strategy<Value = Widget> {
    (0u64..8, prop::string::string_regex("[a-z]{1,6}").expect("valid regex"))
        .prop_map(|(id, label)| Widget::new(id, label))
}

/// Strategy for a single mutation.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        4 => widget_strategy().prop_map(Mutation::Add),
        4 => widget_strategy().prop_map(Mutation::Remove),
        1 => Just(Mutation::Clear),
    ]
}

/// Strategy for a mutation sequence of up to `max` operations.
pub fn mutation_sequence_strategy(max: usize) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), 0..=max)
}
