//! Unit tests for the coder-deterministic shuffle

#[cfg(test)]
mod tests {
    use super::super::random_indices;

    #[test]
    fn same_seed_gives_same_order() {
        assert_eq!(random_indices(7, 20), random_indices(7, 20));
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut order = random_indices(42, 50);
        order.sort_unstable();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn different_seeds_give_different_orders() {
        // not guaranteed for tiny n, but overwhelmingly so for 20 elements
        assert_ne!(random_indices(7, 20), random_indices(8, 20));
    }

    #[test]
    fn empty_and_single_element_orders() {
        assert!(random_indices(1, 0).is_empty());
        assert_eq!(random_indices(1, 1), vec![0]);
    }
}
