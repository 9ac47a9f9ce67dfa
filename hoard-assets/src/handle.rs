use std::fmt::{self, Debug};

use crate::id::{Id, UntypedId};

/// One counted reference to an asset record.
///
/// Every successful `load`/`load_async` call hands out a handle and bumps
/// the record's reference count. Handles are deliberately not `Clone`:
/// give each one back exactly once through [`Assets::unload`].
///
/// [`Assets::unload`]: crate::Assets::unload
#[must_use = "dropping a handle leaks its reference, pass it to `Assets::unload`"]
pub struct Handle<T> {
    id: Id<T>,
}

impl<T: 'static> Handle<T> {
    pub(crate) fn new(id: Id<T>) -> Handle<T> {
        Handle { id }
    }

    pub fn id(&self) -> Id<T> {
        self.id
    }

    pub fn untyped_id(&self) -> UntypedId {
        self.id.untyped()
    }
}

impl<T: 'static> Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

impl<T: 'static> Eq for Handle<T> {}

impl<T: 'static> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
