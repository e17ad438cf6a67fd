use std::cmp::Ordering;

/// Stable merge sort driven by an arbitrary comparator.
///
/// User comparators can be inconsistent (or fail and report `Equal`), which
/// `slice::sort_by` is allowed to panic on. This sort never panics: a bad
/// comparator only yields a bad order. Elements comparing `Equal` keep
/// their original relative order.
pub fn stable_sort_by<T, F>(items: Vec<T>, compare: &mut F) -> Vec<T>
where
  F: FnMut(&T, &T) -> Ordering,
{
  if items.len() <= 1 {
    return items;
  }

  let mut left = items;
  let right = left.split_off(left.len() / 2);
  let left = stable_sort_by(left, compare);
  let right = stable_sort_by(right, compare);
  merge(left, right, compare)
}

fn merge<T, F>(left: Vec<T>, right: Vec<T>, compare: &mut F) -> Vec<T>
where
  F: FnMut(&T, &T) -> Ordering,
{
  let mut merged = Vec::with_capacity(left.len() + right.len());
  let mut left = left.into_iter().peekable();
  let mut right = right.into_iter().peekable();

  loop {
    // Take from the right only when it strictly sorts first.
    let take_right = match (left.peek(), right.peek()) {
      (Some(l), Some(r)) => compare(l, r) == Ordering::Greater,
      (Some(_), None) => false,
      (None, Some(_)) => true,
      (None, None) => break,
    };
    let next = if take_right { right.next() } else { left.next() };
    merged.extend(next);
  }

  merged
}
