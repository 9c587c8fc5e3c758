use uuid::Uuid;

/// convenience for test code: create a node id based on a number, the same
///  number generating the same id and different numbers different ids
pub fn test_node_id(number: u16) -> Uuid {
    Uuid::from_u128(number as u128)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ids_are_stable_and_distinct() {
        assert_eq!(test_node_id(7), test_node_id(7));
        assert_ne!(test_node_id(7), test_node_id(8));
        assert!(test_node_id(1) < test_node_id(2));
    }
}
