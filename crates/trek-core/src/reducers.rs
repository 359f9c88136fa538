//! Pure merge functions for state collections.
//!
//! Every collection in [`crate::state::TripState`] is folded through one of
//! these two reducers when an update commits — nodes never touch the
//! collections directly, so reapplying a committed update is always safe.

use indexmap::IndexMap;

/// Anything addressable by a stable string key.
pub trait Keyed {
    /// The merge key (a place id).
    fn key(&self) -> &str;
}

/// Append reducer: concatenates incoming items onto an ordered sequence.
///
/// No de-duplication; order of application is order of arrival. Used for
/// `itinerary`, `messages`, and `research_notes`.
pub fn append<T>(current: &mut Vec<T>, incoming: Vec<T>) {
    current.extend(incoming);
}

/// Merge-by-id reducer.
///
/// Every key present in either side appears exactly once. Keys present in
/// both take the incoming value, in place — iteration order stays
/// first-seen order, which keeps client rendering deterministic. Merging
/// a set with itself is a no-op; merging disjoint sets is commutative up
/// to order.
pub fn merge_by_id<T: Keyed>(current: &mut IndexMap<String, T>, incoming: Vec<T>) {
    for item in incoming {
        // IndexMap::insert keeps the original position for existing keys.
        let _ = current.insert(item.key().to_owned(), item);
    }
}
