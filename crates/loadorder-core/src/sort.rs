//! Resolution of loading orders into a single total order.
//!
//! # Design
//!
//! Each call builds a scratch precedence graph over item indices. For every
//! item `n` the graph stores its predecessors, the items that must come
//! strictly before it:
//! - items named by `n`'s `AFTER` clauses,
//! - items whose `BEFORE` clauses name `n`'s id,
//! - every non-`LAST` item when `n` is `LAST`,
//! - every `FIRST` item when `n` is not `FIRST`.
//!
//! The order is produced by a depth-first walk over predecessor edges. Roots
//! are visited in input order and predecessors in ascending input index, and
//! a node is emitted once all its predecessors are. Unrelated items therefore
//! keep their declared sequence unless a constraint pulls one of them earlier.
//! A predecessor met again while still on the active path closes a cycle.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::order::LoadingOrder;

/// Something that can be placed by [`sort`].
pub trait Orderable {
    /// Describes the declaration of an item when its constraints conflict.
    /// Rendered into the [`ConflictError`] message.
    type Payload: Display;

    /// Identifier other items use in `BEFORE`/`AFTER` clauses.
    fn order_id(&self) -> Option<&str>;
    fn order(&self) -> &LoadingOrder;
    fn conflict_payload(&self) -> Self::Payload;
}

impl<T: Orderable + ?Sized> Orderable for &T {
    type Payload = T::Payload;

    fn order_id(&self) -> Option<&str> {
        (**self).order_id()
    }

    fn order(&self) -> &LoadingOrder {
        (**self).order()
    }

    fn conflict_payload(&self) -> Self::Payload {
        (**self).conflict_payload()
    }
}

/// The loading orders of two items contradict each other.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not satisfy sorting requirements: {first} conflicts with {second}")]
pub struct ConflictError<P> {
    pub first: P,
    pub second: P,
}

/// Reorders `items` so that every loading order is satisfied.
///
/// # Errors
/// Returns [`ConflictError`] with the payloads of two items on a cycle. The
/// slice is left exactly as it was.
#[instrument(skip_all, fields(items = items.len()))]
pub fn sort<T: Orderable>(items: &mut [T]) -> Result<(), ConflictError<T::Payload>> {
    let order = sorted_indices(items)?;
    apply_order(items, &order);
    Ok(())
}

/// Computes the order [`sort`] would produce, as indices into `items`.
pub fn sorted_indices<T: Orderable>(items: &[T]) -> Result<Vec<usize>, ConflictError<T::Payload>> {
    let graph = PrecedenceGraph::build(items);
    graph.topological_order().map_err(|(first, second)| {
        debug!(first, second, "loading orders form a cycle");
        ConflictError {
            first: items[first].conflict_payload(),
            second: items[second].conflict_payload(),
        }
    })
}

struct PrecedenceGraph {
    /// Predecessor indices per item, ascending.
    predecessors: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

impl PrecedenceGraph {
    fn build<T: Orderable>(items: &[T]) -> Self {
        let mut by_id: HashMap<&str, usize> = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            if let Some(id) = non_empty_id(item) {
                if let Some(previous) = by_id.insert(id, index) {
                    debug!(id, previous, index, "duplicate order id, later declaration wins");
                }
            }
        }

        let predecessors = items
            .iter()
            .map(|item| {
                let order = item.order();
                let id = non_empty_id(item);

                let mut preds: BTreeSet<usize> = order
                    .after_ids()
                    .iter()
                    .filter_map(|after| by_id.get(after.as_str()).copied())
                    .collect();

                for (other_index, other) in items.iter().enumerate() {
                    let theirs = other.order();
                    if id.is_some_and(|id| theirs.before_ids().contains(id))
                        || (order.is_last() && !theirs.is_last())
                        || (theirs.is_first() && !order.is_first())
                    {
                        preds.insert(other_index);
                    }
                }

                preds.into_iter().collect()
            })
            .collect();

        Self { predecessors }
    }

    /// Returns the emission order, or the `(predecessor, node)` edge that
    /// closed a cycle.
    fn topological_order(&self) -> Result<Vec<usize>, (usize, usize)> {
        let count = self.predecessors.len();
        let mut marks = vec![Mark::Unvisited; count];
        let mut order = Vec::with_capacity(count);
        // (node, position of the next predecessor to visit)
        let mut path: Vec<(usize, usize)> = Vec::new();

        for root in 0..count {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::OnPath;
            path.push((root, 0));

            while let Some(frame) = path.last_mut() {
                let (node, cursor) = *frame;
                match self.predecessors[node].get(cursor) {
                    Some(&pred) => {
                        frame.1 += 1;
                        match marks[pred] {
                            Mark::Unvisited => {
                                marks[pred] = Mark::OnPath;
                                path.push((pred, 0));
                            }
                            Mark::OnPath => return Err((pred, node)),
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        order.push(node);
                        path.pop();
                    }
                }
            }
        }

        Ok(order)
    }
}

fn non_empty_id<T: Orderable>(item: &T) -> Option<&str> {
    item.order_id().filter(|id| !id.is_empty())
}

/// Moves `items[order[k]]` to position `k` for every `k`.
fn apply_order<T>(items: &mut [T], order: &[usize]) {
    let mut target = vec![0; order.len()];
    for (position, &index) in order.iter().enumerate() {
        target[index] = position;
    }

    for slot in 0..items.len() {
        while target[slot] != slot {
            let destination = target[slot];
            items.swap(slot, destination);
            target.swap(slot, destination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        id: Option<&'static str>,
        order: LoadingOrder,
    }

    impl Item {
        fn new(name: &'static str, id: Option<&'static str>, order: &str) -> Self {
            Self {
                name,
                id,
                order: LoadingOrder::parse(order).expect("test order should parse"),
            }
        }

        fn any(name: &'static str) -> Self {
            Self {
                name,
                id: None,
                order: LoadingOrder::ANY,
            }
        }

        fn named(name: &'static str) -> Self {
            Self {
                name,
                id: Some(name),
                order: LoadingOrder::ANY,
            }
        }
    }

    impl Orderable for Item {
        type Payload = &'static str;

        fn order_id(&self) -> Option<&str> {
            self.id
        }

        fn order(&self) -> &LoadingOrder {
            &self.order
        }

        fn conflict_payload(&self) -> Self::Payload {
            self.name
        }
    }

    fn names(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|item| item.name).collect()
    }

    fn sorted(mut items: Vec<Item>) -> Vec<&'static str> {
        sort(&mut items).expect("items should sort");
        names(&items)
    }

    #[test]
    fn empty_and_single_inputs_sort() {
        let mut empty: Vec<Item> = Vec::new();
        assert!(sort(&mut empty).is_ok());
        assert_eq!(sorted(vec![Item::new("a", None, "LAST")]), vec!["a"]);
    }

    #[test]
    fn flags_and_declaration_order_place_items() {
        let items = vec![
            Item::any("x"),
            Item::new("y", Some("y"), "BEFORE irrelevant"),
            Item::new("z", None, "LAST"),
            Item::new("w", None, "FIRST"),
        ];
        assert_eq!(sorted(items), vec!["w", "x", "y", "z"]);
    }

    #[test]
    fn unconstrained_items_keep_declaration_order() {
        let items = vec![Item::any("c"), Item::any("a"), Item::any("b")];
        assert_eq!(sorted(items), vec!["c", "a", "b"]);
    }

    #[test]
    fn after_places_target_first() {
        let items = vec![Item::new("a", Some("a"), "AFTER b"), Item::named("b")];
        assert_eq!(sorted(items), vec!["b", "a"]);
    }

    #[test]
    fn before_places_declarer_first() {
        let items = vec![Item::named("a"), Item::new("b", Some("b"), "BEFORE a")];
        assert_eq!(sorted(items), vec!["b", "a"]);
    }

    #[test]
    fn before_reaches_items_without_constraints() {
        let items = vec![
            Item::named("target"),
            Item::any("bystander"),
            Item::new("early", None, "BEFORE target"),
        ];
        assert_eq!(sorted(items), vec!["early", "target", "bystander"]);
    }

    #[test]
    fn chained_constraints_resolve_transitively() {
        let items = vec![
            Item::new("c", Some("c"), "AFTER b"),
            Item::new("b", Some("b"), "AFTER a"),
            Item::named("a"),
        ];
        assert_eq!(sorted(items), vec!["a", "b", "c"]);
    }

    #[test]
    fn several_first_items_keep_relative_order() {
        let items = vec![
            Item::any("plain"),
            Item::new("f1", None, "FIRST"),
            Item::new("l1", None, "LAST"),
            Item::new("f2", None, "FIRST"),
            Item::new("l2", None, "LAST"),
        ];
        assert_eq!(sorted(items), vec!["f1", "f2", "plain", "l1", "l2"]);
    }

    #[test]
    fn before_refines_order_among_first_items() {
        let items = vec![
            Item::new("f1", Some("f1"), "FIRST"),
            Item::new("f2", Some("f2"), "FIRST, BEFORE f1"),
        ];
        assert_eq!(sorted(items), vec!["f2", "f1"]);
    }

    #[test]
    fn dangling_references_are_ignored() {
        let items = vec![
            Item::new("a", Some("a"), "AFTER missing"),
            Item::new("b", Some("b"), "BEFORE nowhere"),
        ];
        assert_eq!(sorted(items), vec!["a", "b"]);
    }

    #[test]
    fn empty_ids_cannot_be_targeted() {
        let items = vec![
            Item {
                name: "follower",
                id: Some("follower"),
                order: LoadingOrder::after(""),
            },
            Item {
                name: "blank",
                id: Some(""),
                order: LoadingOrder::ANY,
            },
            Item {
                name: "leader",
                id: Some("leader"),
                order: LoadingOrder::before(""),
            },
        ];
        assert_eq!(sorted(items), vec!["follower", "blank", "leader"]);
    }

    #[test]
    fn duplicate_ids_resolve_to_last_declaration() {
        let items = vec![
            Item::named("dup"),
            Item::new("follower", Some("follower"), "AFTER dup"),
            Item {
                name: "dup-2",
                id: Some("dup"),
                order: LoadingOrder::ANY,
            },
        ];
        assert_eq!(sorted(items), vec!["dup", "dup-2", "follower"]);
    }

    #[test]
    fn mutual_after_is_a_conflict_and_leaves_input_intact() {
        let mut items = vec![
            Item::any("bystander"),
            Item::new("a", Some("a"), "AFTER b"),
            Item::new("b", Some("b"), "AFTER a"),
        ];
        let original = items.clone();

        let err = sort(&mut items).expect_err("cycle must fail");
        let mut pair = [err.first, err.second];
        pair.sort_unstable();
        assert_eq!(pair, ["a", "b"]);
        assert_eq!(items, original);
        assert!(err.to_string().starts_with("could not satisfy sorting requirements"));
    }

    #[test]
    fn first_and_last_on_one_item_conflicts_with_plain_items() {
        let mut items = vec![Item::new("both", None, "FIRST, LAST"), Item::any("plain")];
        let original = items.clone();
        let err = sort(&mut items).expect_err("contradiction must fail");
        assert_ne!(err.first, err.second);
        assert_eq!(items, original);
    }

    #[test]
    fn first_and_last_on_one_item_sits_between_flagged_items() {
        let items = vec![
            Item::new("last", None, "LAST"),
            Item::new("both", None, "FIRST, LAST"),
            Item::new("first", None, "FIRST"),
        ];
        assert_eq!(sorted(items), vec!["first", "both", "last"]);
    }

    #[test]
    fn first_item_after_plain_item_is_a_conflict() {
        let mut items = vec![Item::named("plain"), Item::new("eager", None, "FIRST, AFTER plain")];
        assert!(sort(&mut items).is_err());
    }

    #[test]
    fn self_reference_is_a_conflict_with_itself() {
        let mut items = vec![Item::new("narcissus", Some("narcissus"), "AFTER narcissus")];
        let err = sort(&mut items).expect_err("self edge must fail");
        assert_eq!((err.first, err.second), ("narcissus", "narcissus"));
    }

    #[test]
    fn sorts_borrowed_items() {
        let owned = vec![Item::new("late", None, "LAST"), Item::any("plain")];
        let mut borrowed: Vec<&Item> = owned.iter().collect();
        sort(&mut borrowed).expect("borrowed items should sort");
        let order: Vec<_> = borrowed.iter().map(|item| item.name).collect();
        assert_eq!(order, vec!["plain", "late"]);
        assert_eq!(names(&owned), vec!["late", "plain"]);
    }

    #[test]
    fn sorted_indices_reports_permutation() {
        let items = vec![Item::new("z", None, "LAST"), Item::any("a"), Item::new("f", None, "FIRST")];
        assert_eq!(sorted_indices(&items).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn apply_order_moves_every_element_once() {
        let mut letters = vec!['a', 'b', 'c', 'd', 'e'];
        apply_order(&mut letters, &[3, 0, 4, 1, 2]);
        assert_eq!(letters, vec!['d', 'a', 'e', 'b', 'c']);
    }

    const IDS: [&str; 6] = ["i0", "i1", "i2", "i3", "i4", "i5"];

    /// Orders that can never form a cycle: references only point to lower
    /// indices (AFTER) or higher indices (BEFORE), no FIRST/LAST mixing.
    fn acyclic_items() -> impl Strategy<Value = Vec<Item>> {
        proptest::collection::vec((any::<bool>(), any::<bool>(), 0usize..6), 1..6).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(index, (after, before, target))| {
                    let mut order = LoadingOrder::ANY;
                    if after && target < index {
                        order = LoadingOrder::after(IDS[target]);
                    } else if before && target > index {
                        order = LoadingOrder::before(IDS[target]);
                    }
                    Item {
                        name: IDS[index],
                        id: Some(IDS[index]),
                        order,
                    }
                })
                .collect()
        })
    }

    fn position(items: &[Item], name: &str) -> usize {
        items
            .iter()
            .position(|item| item.name == name)
            .expect("item should survive sorting")
    }

    proptest! {
        #[test]
        fn sort_is_a_permutation_honouring_references(items in acyclic_items()) {
            let mut sorted_items = items.clone();
            prop_assert!(sort(&mut sorted_items).is_ok());

            let mut before_names = names(&items);
            let mut after_names = names(&sorted_items);
            before_names.sort_unstable();
            after_names.sort_unstable();
            prop_assert_eq!(before_names, after_names);

            for item in &items {
                for target in item.order.after_ids() {
                    prop_assert!(position(&sorted_items, target) < position(&sorted_items, item.name));
                }
                for target in item.order.before_ids() {
                    prop_assert!(position(&sorted_items, item.name) < position(&sorted_items, target));
                }
            }
        }

        #[test]
        fn flags_split_items_into_bands(flags in proptest::collection::vec(0u8..3, 0..12)) {
            let mut items: Vec<Item> = flags
                .iter()
                .enumerate()
                .map(|(index, flag)| Item {
                    name: IDS[index % IDS.len()],
                    id: None,
                    order: match flag {
                        0 => LoadingOrder::FIRST,
                        1 => LoadingOrder::LAST,
                        _ => LoadingOrder::ANY,
                    },
                })
                .collect();
            let bands: Vec<u8> = flags.iter().map(|flag| match flag { 0 => 0, 1 => 2, _ => 1 }).collect();
            let original_indices = sorted_indices(&items).expect("flags alone never conflict");
            sort(&mut items).expect("flags alone never conflict");

            let sorted_bands: Vec<u8> = original_indices.iter().map(|&index| bands[index]).collect();
            let mut expected = sorted_bands.clone();
            expected.sort_unstable();
            prop_assert_eq!(&sorted_bands, &expected);

            // within a band the declared sequence is kept
            for pair in original_indices.windows(2) {
                if bands[pair[0]] == bands[pair[1]] {
                    prop_assert!(pair[0] < pair[1]);
                }
            }
        }
    }
}
