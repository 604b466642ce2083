use super::*;

#[test]
fn evicts_oldest_first() {
    let mut history = RollingHistory::with_capacity(3);

    assert_eq!(history.push(1), None);
    assert_eq!(history.push(2), None);
    assert_eq!(history.push(3), None);
    assert_eq!(history.push(4), Some(1));
    assert_eq!(history.push(5), Some(2));

    assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
    assert_eq!(history.oldest(), Some(&3));
    assert_eq!(history.newest(), Some(&5));
    assert_eq!(history.len(), 3);
}

#[test]
fn never_exceeds_capacity() {
    let mut history = RollingHistory::with_capacity(8);
    for i in 0..100 {
        history.push(i);
        assert!(history.len() <= history.capacity());
    }
    assert_eq!(history.oldest(), Some(&92));
}

#[test]
fn undoing_a_push_restores_previous_contents() {
    let mut history = RollingHistory::with_capacity(2);
    history.push("a");
    history.push("b");
    let before = history.clone();

    let evicted = history.push("c");
    assert_eq!(history.pop_newest(), Some("c"));
    if let Some(entry) = evicted {
        history.restore_oldest(entry);
    }

    assert_eq!(history, before);
}

#[test]
fn restore_is_ignored_when_full() {
    let mut history = RollingHistory::with_capacity(1);
    history.push("kept");
    history.restore_oldest("dropped");

    assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec!["kept"]);
}

#[test]
fn zero_capacity_is_raised_to_one() {
    let mut history = RollingHistory::with_capacity(0);
    assert_eq!(history.capacity(), 1);
    history.push('x');
    assert_eq!(history.push('y'), Some('x'));
}

#[test]
fn clear_empties_history() {
    let mut history = RollingHistory::with_capacity(4);
    history.push(1);
    history.clear();
    assert!(history.is_empty());
    assert_eq!(history.capacity(), 4);
}
