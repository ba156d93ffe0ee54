use std::collections::{BTreeSet, VecDeque};
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use log::trace;
use num::{Float, FromPrimitive};

use crate::common::StreamObject;

use super::scorer::ProbeState;

/// Callbacks fired by the registry on flag transitions and evictions.
/// Fire-and-forget: the registry does not care what the observer does with
/// them, and all methods default to no-ops.
pub trait OutlierObserver<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign>
{
    /// A live object just became an outlier.
    fn on_outlier(&mut self, _object: &StreamObject<F>) {}
    /// A formerly flagged live object is no longer an outlier.
    fn on_inlier(&mut self, _object: &StreamObject<F>) {}
    /// An object left the window; distinct from `on_inlier`, since the object
    /// may well still have been an outlier when its time ran out.
    fn on_evicted(&mut self, _object: &StreamObject<F>) {}
}

/// The default observer: ignores everything.
pub struct NoopObserver;

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> OutlierObserver<F>
    for NoopObserver
{
}

/// One live object together with its refinement state. Keeping both in a
/// single record is what pins the window and the probe map in lockstep.
pub(crate) struct Slot<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> {
    pub(crate) object: StreamObject<F>,
    pub(crate) probe: ProbeState<F>,
}

/// Strict FIFO of the most recently arrived objects, bounded by the window
/// size, plus the current outlier set. Ids are assigned monotonically and
/// every admitted object stays until exactly `capacity` newer ones arrived,
/// so id-to-slot lookup is a dense offset from the oldest id rather than a
/// map.
pub struct SlidingWindow<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign>
{
    slots: VecDeque<Slot<F>>,
    capacity: usize,
    outliers: BTreeSet<u64>,
}

impl<F: Float + FromPrimitive + AddAssign + SubAssign + MulAssign + DivAssign> SlidingWindow<F> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
            outliers: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index_of(id).is_some()
    }

    /// Ids currently live, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().map(|slot| slot.object.id)
    }

    /// Ids currently flagged as outliers, ascending.
    pub fn outliers(&self) -> impl Iterator<Item = u64> + '_ {
        self.outliers.iter().copied()
    }

    pub fn outlier_count(&self) -> usize {
        self.outliers.len()
    }

    fn index_of(&self, id: u64) -> Option<usize> {
        let front = self.slots.front()?.object.id;
        if id < front {
            return None;
        }
        let index = (id - front) as usize;
        if index < self.slots.len() {
            Some(index)
        } else {
            None
        }
    }

    pub(crate) fn get(&self, id: u64) -> Option<&Slot<F>> {
        self.index_of(id).map(|index| &self.slots[index])
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut Slot<F>> {
        match self.index_of(id) {
            Some(index) => Some(&mut self.slots[index]),
            None => None,
        }
    }

    /// Admit a new object, evicting the oldest one first if the window is
    /// full. Returns the evicted id, if any.
    pub(crate) fn admit<O: OutlierObserver<F>>(
        &mut self,
        object: StreamObject<F>,
        probe: ProbeState<F>,
        observer: &mut O,
    ) -> Option<u64> {
        let mut evicted = None;
        if self.slots.len() >= self.capacity {
            evicted = self.evict_oldest(observer);
        }
        self.slots.push_back(Slot { object, probe });
        evicted
    }

    /// Drop the oldest object and its probe state. Removing its id from the
    /// outlier set needs no membership check, and evicting from an empty
    /// window is a silent no-op.
    pub(crate) fn evict_oldest<O: OutlierObserver<F>>(&mut self, observer: &mut O) -> Option<u64> {
        let slot = self.slots.pop_front()?;
        self.outliers.remove(&slot.object.id);
        trace!("window: evicted object {}", slot.object.id);
        observer.on_evicted(&slot.object);
        Some(slot.object.id)
    }

    /// Mark a live object as an outlier. Deduplicated by id: flagging an
    /// already flagged object changes nothing and notifies nobody.
    pub(crate) fn flag<O: OutlierObserver<F>>(&mut self, id: u64, observer: &mut O) {
        let index = match self.index_of(id) {
            Some(index) => index,
            None => return,
        };
        if self.outliers.insert(id) {
            let slot = &mut self.slots[index];
            slot.object.outlier = true;
            trace!("window: object {} flagged as outlier", id);
            observer.on_outlier(&slot.object);
        }
    }

    /// Clear a live object's outlier mark. A no-op for ids that were never
    /// flagged or are no longer in the window.
    pub(crate) fn unflag<O: OutlierObserver<F>>(&mut self, id: u64, observer: &mut O) {
        let removed = self.outliers.remove(&id);
        if let Some(index) = self.index_of(id) {
            if removed {
                let slot = &mut self.slots[index];
                slot.object.outlier = false;
                trace!("window: object {} back to inlier", id);
                observer.on_inlier(&slot.object);
            }
        }
    }
}
