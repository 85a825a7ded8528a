use std::sync::atomic::{AtomicU64, Ordering};

// process-wide source of tags.  Starts at 1 so that a
// zeroed Tag can never match one handed out here.
static TAG_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity marker attached to matrix data.
///
/// Tags are drawn from a monotonic counter shared by all matrices, so two
/// tags compare equal only if they were handed out for the same state of
/// the same matrix (or of a clone of it).   Tags carry no ordering meaning
/// for users and should only be compared for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u64);

impl Tag {
    /// A new tag, distinct from every tag handed out before.
    pub fn fresh() -> Self {
        Tag(TAG_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[test]
fn test_tags_unique() {
    let a = Tag::fresh();
    let b = Tag::fresh();
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}
