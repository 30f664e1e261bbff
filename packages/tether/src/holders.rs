//! Diagnostic ledger of live owning handles.
//!
//! Only compiled with the `holder-tracking` feature. Every owning handle
//! registers itself here on creation and removes itself on drop, chained
//! per target object, so a leak investigation can ask any handle "who else
//! is keeping this thing alive" and get call sites back.
//!
//! The ledger is process-wide and guarded by a mutex, which makes handle
//! creation and destruction measurably slower. This is a debugging aid,
//! not something to ship enabled.

use std::fmt::{self, Display, Formatter};
use std::panic::Location;
use std::sync::Mutex;

use crate::anchor::Anchor;
use crate::constants::ERR_POISONED_LOCK;

/// Sentinel record index meaning "no record here".
pub(crate) const NO_RECORD: u32 = u32::MAX;

static LEDGER: Mutex<Ledger> = Mutex::new(Ledger {
    entries: Vec::new(),
    first_free: NO_RECORD,
});

/// One live owning handle.
struct Record {
    /// Where the handle was created. `None` for handles made through
    /// `Clone`, which the language cannot annotate with a caller location.
    location: Option<&'static Location<'static>>,

    /// Adjacent records of the same object, forming a doubly linked chain
    /// whose head index lives in the object's anchor.
    prev: u32,
    next: u32,
}

enum Entry {
    Occupied(Record),

    /// A free entry, linking to the next free one (`NO_RECORD` at the end).
    Vacant { next_free: u32 },
}

struct Ledger {
    entries: Vec<Entry>,
    first_free: u32,
}

impl Ledger {
    fn insert(&mut self, record: Record) -> u32 {
        if self.first_free == NO_RECORD {
            let index = u32::try_from(self.entries.len())
                .expect("more than u32::MAX live handles cannot exist; counters cap out first");

            assert!(index != NO_RECORD, "holder ledger is full");

            self.entries.push(Entry::Occupied(record));
            return index;
        }

        let index = self.first_free;

        let entry = self.entry_mut(index);
        let Entry::Vacant { next_free } = *entry else {
            unreachable!("free list pointed at an occupied ledger entry");
        };

        *entry = Entry::Occupied(record);
        self.first_free = next_free;
        index
    }

    fn remove(&mut self, index: u32) {
        let next_free = self.first_free;

        let entry = self.entry_mut(index);
        debug_assert!(
            matches!(entry, Entry::Occupied(_)),
            "removing a holder record that is not present"
        );

        *entry = Entry::Vacant { next_free };
        self.first_free = index;
    }

    fn entry_mut(&mut self, index: u32) -> &mut Entry {
        let index = usize::try_from(index).expect("u32 fits in usize on supported platforms");

        self.entries
            .get_mut(index)
            .expect("holder record index out of ledger bounds")
    }

    fn record(&self, index: u32) -> &Record {
        let index = usize::try_from(index).expect("u32 fits in usize on supported platforms");

        match self.entries.get(index) {
            Some(Entry::Occupied(record)) => record,
            _ => panic!("holder chain referenced a vacant ledger entry"),
        }
    }

    fn record_mut(&mut self, index: u32) -> &mut Record {
        match self.entry_mut(index) {
            Entry::Occupied(record) => record,
            Entry::Vacant { .. } => panic!("holder chain referenced a vacant ledger entry"),
        }
    }
}

/// Records a new handle of `anchor`'s object and returns its record index.
pub(crate) fn attach(anchor: &Anchor, location: Option<&'static Location<'static>>) -> u32 {
    let mut ledger = LEDGER.lock().expect(ERR_POISONED_LOCK);

    let head = anchor.holder_head();

    let record = ledger.insert(Record {
        location,
        prev: NO_RECORD,
        next: head,
    });

    if head != NO_RECORD {
        ledger.record_mut(head).prev = record;
    }

    // The chain head is only read and written under the ledger lock, so a
    // relaxed store on the anchor side is enough.
    anchor.set_holder_head(record);

    record
}

/// Removes a dropped handle's record from its object's chain.
pub(crate) fn detach(anchor: &Anchor, record: u32) {
    let mut ledger = LEDGER.lock().expect(ERR_POISONED_LOCK);

    let (prev, next) = {
        let record = ledger.record(record);
        (record.prev, record.next)
    };

    if prev == NO_RECORD {
        debug_assert_eq!(
            anchor.holder_head(),
            record,
            "a holder record without a predecessor must be the chain head"
        );

        anchor.set_holder_head(next);
    } else {
        ledger.record_mut(prev).next = next;
    }

    if next != NO_RECORD {
        ledger.record_mut(next).prev = prev;
    }

    ledger.remove(record);
}

/// Snapshots the call sites of every live handle of `anchor`'s object.
pub(crate) fn report_for(anchor: &Anchor) -> HolderReport {
    let ledger = LEDGER.lock().expect(ERR_POISONED_LOCK);

    let mut call_sites = Vec::new();
    let mut cursor = anchor.holder_head();

    while cursor != NO_RECORD {
        let record = ledger.record(cursor);
        call_sites.push(record.location);
        cursor = record.next;
    }

    HolderReport { call_sites }
}

/// A point-in-time listing of every owning handle of one object.
///
/// Obtained from [`Strong::holders()`][crate::Strong::holders]. Handles are
/// listed newest first; handles created through `Clone` appear without a
/// call site. The snapshot does not keep the object alive and is not
/// updated as handles come and go after it was taken.
///
/// The [`Display`] form is one line per handle, ready for a log or panic
/// message.
#[derive(Debug)]
pub struct HolderReport {
    /// Newest first.
    call_sites: Vec<Option<&'static Location<'static>>>,
}

impl HolderReport {
    /// Number of owning handles at the time the snapshot was taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.call_sites.len()
    }

    /// Whether no owning handles existed at the time the snapshot was
    /// taken. Can only be observed from inside the target's destructor,
    /// since taking the snapshot through a handle implies one holder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.call_sites.is_empty()
    }

    /// Call sites of the handles, newest first. `None` marks a handle
    /// created through `Clone`.
    pub fn call_sites(&self) -> impl Iterator<Item = Option<&'static Location<'static>>> + '_ {
        self.call_sites.iter().copied()
    }
}

impl Display for HolderReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} live handle(s):", self.call_sites.len())?;

        for call_site in &self.call_sites {
            match call_site {
                Some(location) => writeln!(f, "  - {location}")?,
                None => writeln!(f, "  - <clone, call site untracked>")?,
            }
        }

        Ok(())
    }
}
